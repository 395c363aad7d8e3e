use chrono::{NaiveDate, NaiveDateTime};

use crate::config::{PIP_VALUE_PER_LOT, POINTS_PER_PIP};
use crate::types::{Direction, ExitReason, SessionSlot, Trade, TradeKind};

pub type TradeId = usize;

/// Lightweight view of an open ledger trade, carried by the session drivers
/// so the engine and drawdown tracker never need the ledger itself.
#[derive(Clone, Copy, Debug)]
pub struct OpenPosition {
    pub id: TradeId,
    pub direction: Direction,
    pub entry_price: f64,
    pub lot_size: f64,
}

/// Signed price distance in pips.
pub fn pips(direction: Direction, entry: f64, exit: f64, point: f64) -> f64 {
    direction.sign() * (exit - entry) / point / POINTS_PER_PIP
}

/// Unrealized P&L of a set of open positions at `price`.
pub fn floating_pnl(open: &[OpenPosition], price: f64, point: f64) -> f64 {
    open.iter()
        .map(|p| pips(p.direction, p.entry_price, price, point) * p.lot_size * PIP_VALUE_PER_LOT)
        .sum()
}

/// Owns every trade of a run and the running account balance.
///
/// Single writer: both session slots of a day funnel their open/close events
/// through one ledger in candle order.
pub struct TradeLedger {
    point: f64,
    initial_balance: f64,
    balance: f64,
    trades: Vec<Trade>,
}

impl TradeLedger {
    pub fn new(initial_balance: f64, point: f64) -> Self {
        TradeLedger {
            point,
            initial_balance,
            balance: initial_balance,
            trades: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_closed())
    }

    pub fn closed_on(&self, date: NaiveDate) -> usize {
        self.trades
            .iter()
            .filter(|t| t.exit_time.map(|x| x.date()) == Some(date))
            .count()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        direction: Direction,
        entry_price: f64,
        entry_time: NaiveDateTime,
        lot_size: f64,
        tp_price: f64,
        kind: TradeKind,
        slot: SessionSlot,
    ) -> TradeId {
        self.trades.push(Trade {
            direction,
            entry_price,
            entry_time,
            lot_size,
            tp_price,
            kind,
            slot,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            profit: None,
            pips: None,
        });
        self.trades.len() - 1
    }

    pub fn open_position(&self, id: TradeId) -> OpenPosition {
        let t = &self.trades[id];
        OpenPosition {
            id,
            direction: t.direction,
            entry_price: t.entry_price,
            lot_size: t.lot_size,
        }
    }

    /// Close a trade and realize its P&L into the balance.
    ///
    /// Closing an already-closed trade is a programming invariant violation
    /// and panics.
    pub fn close(
        &mut self,
        id: TradeId,
        exit_price: f64,
        exit_time: NaiveDateTime,
        reason: ExitReason,
    ) -> f64 {
        let point = self.point;
        let trade = &mut self.trades[id];
        assert!(
            trade.exit_reason.is_none(),
            "trade {} already closed ({:?})",
            id,
            trade.exit_reason
        );

        let trade_pips = pips(trade.direction, trade.entry_price, exit_price, point);
        let profit = trade_pips * trade.lot_size * PIP_VALUE_PER_LOT;

        trade.exit_price = Some(exit_price);
        trade.exit_time = Some(exit_time);
        trade.exit_reason = Some(reason);
        trade.pips = Some(trade_pips);
        trade.profit = Some(profit);

        self.balance += profit;
        profit
    }
}
