use chrono::{Datelike, NaiveDate, Weekday};

use crate::config::{slot_config, POINT};
use crate::drawdown::{DrawdownTracker, SessionDrawdowns};
use crate::ledger::{OpenPosition, TradeLedger};
use crate::range::compute_range;
use crate::session::{SessionEngine, SessionEvent};
use crate::stats::{build_report, DailyEquity, Report};
use crate::types::{Candle, ExitReason, SessionSlot, Trade};

/// Candle-by-candle historical simulation.
///
/// Deterministic: identical input candles produce identical trades and
/// final balance. Morning and afternoon slots run sequentially per day and
/// share only the ledger.
pub struct Backtester {
    base_lot: f64,
    ledger: TradeLedger,
    daily_equity: Vec<DailyEquity>,
    session_dd: SessionDrawdowns,
}

impl Backtester {
    pub fn new(initial_balance: f64, base_lot: f64) -> Self {
        Backtester {
            base_lot,
            ledger: TradeLedger::new(initial_balance, POINT),
            daily_equity: Vec::new(),
            session_dd: SessionDrawdowns::default(),
        }
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn trades(&self) -> &[Trade] {
        self.ledger.trades()
    }

    /// Run the simulation over a candle history and build the report.
    /// Returns `None` when no trade was closed.
    pub fn run(&mut self, candles: &[Candle]) -> Option<Report> {
        let mut candles: Vec<Candle> = candles.to_vec();
        candles.sort_by_key(|c| c.timestamp);

        let mut dates: Vec<NaiveDate> = candles.iter().map(|c| c.date()).collect();
        dates.dedup();

        log::info!("Backtest over {} days, {} candles", dates.len(), candles.len());

        for date in dates {
            let weekday = date.weekday();
            if weekday == Weekday::Sat || weekday == Weekday::Sun {
                continue;
            }
            let day: Vec<Candle> = candles.iter().filter(|c| c.date() == date).cloned().collect();
            if day.is_empty() {
                continue;
            }

            log::info!("Trading day {} ({:?})", date, weekday);
            let balance_start = self.ledger.balance();

            self.run_session(SessionSlot::Morning, &day);
            self.run_session(SessionSlot::Afternoon, &day);

            let balance = self.ledger.balance();
            self.daily_equity.push(DailyEquity {
                date,
                weekday: format!("{:?}", weekday),
                balance,
                daily_profit: balance - balance_start,
                trades_closed: self.ledger.closed_on(date),
            });
            log::info!(
                "End of day balance: {:.2} (daily P/L {:+.2})",
                balance,
                balance - balance_start
            );
        }

        build_report(
            self.ledger.initial_balance(),
            self.base_lot,
            self.ledger.trades(),
            &self.daily_equity,
            &self.session_dd,
        )
    }

    fn run_session(&mut self, slot: SessionSlot, day: &[Candle]) {
        let cfg = slot_config(slot);

        let range = match compute_range(day, cfg.range_start, cfg.range_end) {
            Some(r) => r,
            None => {
                log::info!("[{}] insufficient candles for range, session skipped", slot);
                return;
            }
        };

        let mut engine = SessionEngine::new(cfg, self.base_lot);
        log_event(slot, &engine.set_range(range));

        let mut tracker = DrawdownTracker::new(self.ledger.balance(), POINT);
        let mut book: Vec<OpenPosition> = Vec::new();
        let mut last_seen: Option<&Candle> = None;

        for candle in day.iter().filter(|c| c.time_of_day() >= cfg.entry_start) {
            last_seen = Some(candle);
            let events = engine.on_candle(candle, &book);
            for event in &events {
                log_event(slot, event);
                self.apply(slot, event, &mut book);
            }
            if engine.is_terminated() {
                break;
            }
            if !book.is_empty() {
                tracker.observe(candle, &book, self.ledger.balance());
            }
        }

        // Data ran out before the slot's boundary with positions still
        // open. Only the afternoon closes them; morning leftovers stay open
        // in the ledger.
        if slot == SessionSlot::Afternoon && !book.is_empty() {
            if let Some(last) = last_seen {
                log::info!(
                    "[{}] force close at end of data ({} positions still open)",
                    slot,
                    book.len()
                );
                for pos in book.drain(..) {
                    self.ledger
                        .close(pos.id, last.close, last.datetime(), ExitReason::SessionEnd);
                }
            }
        }

        self.session_dd.record(slot, tracker.max_drawdown());
    }

    fn apply(&mut self, slot: SessionSlot, event: &SessionEvent, book: &mut Vec<OpenPosition>) {
        match event {
            SessionEvent::ScaleTriggered {
                direction,
                level,
                lot_size,
                tp_price,
                kind,
                time,
            } => {
                let id = self.ledger.open(
                    *direction, *level, *time, *lot_size, *tp_price, *kind, slot,
                );
                book.push(self.ledger.open_position(id));
            }
            SessionEvent::Closed { price, reason, time } => {
                for pos in book.drain(..) {
                    let profit = self.ledger.close(pos.id, *price, *time, *reason);
                    log::info!(
                        "[{}] trade closed: {} @ {:.5} -> {:.5} | {:+.2} | {}",
                        slot,
                        pos.direction,
                        pos.entry_price,
                        price,
                        profit,
                        reason
                    );
                }
            }
            _ => {}
        }
    }
}

fn log_event(slot: SessionSlot, event: &SessionEvent) {
    match event {
        SessionEvent::RangeSet { high, low } => {
            log::info!("[{}] range {:.5} - {:.5}", slot, high, low)
        }
        SessionEvent::BreakoutArmed {
            direction,
            price,
            tp_price,
            ..
        } => log::info!(
            "[{}] BREAKOUT {} @ {:.5}, TP {:.5} (no initial trade, scales only)",
            slot,
            direction,
            price,
            tp_price
        ),
        SessionEvent::ScaleTriggered {
            direction,
            level,
            lot_size,
            ..
        } => log::info!(
            "[{}] SCALE {} @ {:.5} with {:.2} lots",
            slot,
            direction,
            level,
            lot_size
        ),
        SessionEvent::Reversed {
            direction,
            price,
            tp_price,
            count,
            ..
        } => log::info!(
            "[{}] REVERSAL #{} -> {} @ {:.5}, TP {:.5}",
            slot,
            count,
            direction,
            price,
            tp_price
        ),
        SessionEvent::Closed { reason, .. } => {
            log::info!("[{}] closing all open positions ({})", slot, reason)
        }
        SessionEvent::Terminated { reason, .. } => {
            log::info!("[{}] session stopped: {}", slot, reason)
        }
    }
}
