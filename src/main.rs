#[cfg(feature = "jemalloc")]
use tikv_jemallocator::Jemalloc;
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[cfg(feature = "jemalloc")]
fn jemalloc_purge() {
    use tikv_jemalloc_ctl::epoch;
    // Advancing the epoch causes jemalloc to evaluate all decay windows
    // and release dirty pages back to the OS via its background purge logic.
    if let Ok(e) = epoch::mib() {
        let _ = e.advance();
    }
    log::debug!("jemalloc: epoch advanced — dirty pages scheduled for release");
}

use chrono::{Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use std::time::Duration;

use range_trader::broker::{BrokerClient, Ticket};
use range_trader::config::{
    slot_config, SlotConfig, INITIAL_BALANCE, LIVE_CANDLE_COUNT, LOT_SIZE, POINT,
    POLL_INTERVAL_SECS, SYMBOL, TIMEFRAME_MIN,
};
use range_trader::ledger::{OpenPosition, TradeLedger};
use range_trader::range::compute_range;
use range_trader::session::{SessionEngine, SessionEvent};
use range_trader::telegram::TelegramBot;
use range_trader::types::{Candle, SessionSlot};

struct TrackedPosition {
    pos: OpenPosition,
    /// Gateway-side ticket. A back-reference only: the gateway owns the
    /// position, we just hand the number back when closing.
    ticket: Ticket,
}

struct LiveSession {
    cfg: SlotConfig,
    engine: SessionEngine,
    book: Vec<TrackedPosition>,
    last_candle_ts: i64,
}

impl LiveSession {
    fn new(slot: SessionSlot) -> Self {
        let cfg = slot_config(slot);
        LiveSession {
            cfg,
            engine: SessionEngine::new(cfg, LOT_SIZE),
            book: Vec::new(),
            last_candle_ts: 0,
        }
    }
}

/// Sleep `secs` or return false when the operator interrupts.
async fn idle(secs: u64) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(secs)) => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let tg = TelegramBot::from_env();
    let broker = BrokerClient::new();
    let mut ledger = TradeLedger::new(INITIAL_BALANCE, POINT);

    let mut current_date = Utc::now().date_naive();
    let mut sessions = [
        LiveSession::new(SessionSlot::Morning),
        LiveSession::new(SessionSlot::Afternoon),
    ];
    let mut trades_today: u32 = 0;
    let mut day_start_balance = ledger.balance();

    log::info!(
        "Range trader started — {} M{} | base lot {:.2} | poll {}s",
        SYMBOL,
        TIMEFRAME_MIN,
        LOT_SIZE,
        POLL_INTERVAL_SECS
    );
    tg.notify_start(SYMBOL, LOT_SIZE).await;

    loop {
        let now = Utc::now();

        // ── Weekend guard ────────────────────────────────────────────────────
        let weekday = now.weekday();
        if weekday == Weekday::Sat || weekday == Weekday::Sun {
            log::info!("Weekend — waiting for next trading day");
            if !idle(3600).await {
                break;
            }
            continue;
        }

        // ── New trading day ──────────────────────────────────────────────────
        let today = now.date_naive();
        if today != current_date {
            let daily_pnl = ledger.balance() - day_start_balance;
            log::info!(
                "New trading day — resetting sessions | yesterday PnL {:+.2}, {} trades",
                daily_pnl,
                trades_today
            );
            tg.notify_daily_summary(daily_pnl, trades_today, ledger.balance())
                .await;
            sessions = [
                LiveSession::new(SessionSlot::Morning),
                LiveSession::new(SessionSlot::Afternoon),
            ];
            trades_today = 0;
            day_start_balance = ledger.balance();
            current_date = today;

            #[cfg(feature = "jemalloc")]
            jemalloc_purge();
        }

        // ── Fetch candles; failures retry on the next poll ───────────────────
        let candles = match broker
            .fetch_candles(SYMBOL, TIMEFRAME_MIN, LIVE_CANDLE_COUNT)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Candle fetch failed: {} — retrying next poll", e);
                if !idle(POLL_INTERVAL_SECS).await {
                    break;
                }
                continue;
            }
        };

        for session in sessions.iter_mut() {
            process_session(
                session,
                &candles,
                today,
                now.time(),
                &broker,
                &tg,
                &mut ledger,
                &mut trades_today,
            )
            .await;
        }

        if !idle(POLL_INTERVAL_SECS).await {
            break;
        }
    }

    // Cooperative shutdown: stop polling, leave open broker positions as-is.
    let open_tickets: Vec<Ticket> = sessions
        .iter()
        .flat_map(|s| s.book.iter().map(|t| t.ticket))
        .collect();
    log::info!(
        "Bot stopped by operator — {} open position(s) left untouched {:?}",
        open_tickets.len(),
        open_tickets
    );
    tg.notify_risk_alert("Bot stopped by operator. Open positions left as-is.")
        .await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn process_session(
    session: &mut LiveSession,
    candles: &[Candle],
    today: NaiveDate,
    now_time: NaiveTime,
    broker: &BrokerClient,
    tg: &TelegramBot,
    ledger: &mut TradeLedger,
    trades_today: &mut u32,
) {
    let cfg = session.cfg;

    // Range acquisition is retried every poll until the window yields one;
    // a thin window is informational, not an error.
    if !session.engine.has_range() && now_time >= cfg.range_end {
        let day: Vec<Candle> = candles
            .iter()
            .filter(|c| c.date() == today)
            .cloned()
            .collect();
        match compute_range(&day, cfg.range_start, cfg.range_end) {
            Some(range) => {
                if let SessionEvent::RangeSet { high, low } = session.engine.set_range(range) {
                    log::info!("[{}] range {:.5} - {:.5}", cfg.slot, high, low);
                    tg.notify_range(cfg.slot, high, low).await;
                }
            }
            None => {
                log::info!("[{}] insufficient candles for range yet", cfg.slot);
            }
        }
    }
    if !session.engine.has_range() {
        return;
    }

    // Newly closed candles for today, oldest first. The gateway only
    // returns closed candles, so each is processed exactly once.
    let fresh: Vec<Candle> = candles
        .iter()
        .filter(|c| {
            c.date() == today
                && c.time_of_day() >= cfg.entry_start
                && c.timestamp > session.last_candle_ts
        })
        .cloned()
        .collect();

    for candle in fresh {
        let open: Vec<OpenPosition> = session.book.iter().map(|t| t.pos).collect();
        let events = session.engine.on_candle(&candle, &open);
        for event in events {
            apply_event(session, event, broker, tg, ledger, trades_today).await;
        }
        session.last_candle_ts = candle.timestamp;
    }
}

async fn apply_event(
    session: &mut LiveSession,
    event: SessionEvent,
    broker: &BrokerClient,
    tg: &TelegramBot,
    ledger: &mut TradeLedger,
    trades_today: &mut u32,
) {
    let slot = session.cfg.slot;
    match event {
        SessionEvent::RangeSet { .. } => {}
        SessionEvent::BreakoutArmed {
            direction,
            price,
            tp_price,
            ..
        } => {
            log::info!(
                "[{}] BREAKOUT {} @ {:.5}, TP {:.5} (no initial trade, scales only)",
                slot,
                direction,
                price,
                tp_price
            );
            tg.notify_breakout(slot, direction, price, tp_price).await;
        }
        SessionEvent::Reversed {
            direction,
            price,
            count,
            ..
        } => {
            log::info!("[{}] REVERSAL #{} -> {} @ {:.5}", slot, count, direction, price);
            tg.notify_reversal(slot, direction, price, count).await;
        }
        SessionEvent::Terminated { reason, .. } => {
            log::info!("[{}] session stopped: {}", slot, reason);
        }
        SessionEvent::ScaleTriggered {
            direction,
            level,
            lot_size,
            tp_price,
            kind,
            time,
        } => {
            match broker
                .open_position(SYMBOL, direction, lot_size, tp_price)
                .await
            {
                Ok(ticket) => {
                    let id = ledger.open(direction, level, time, lot_size, tp_price, kind, slot);
                    session.book.push(TrackedPosition {
                        pos: ledger.open_position(id),
                        ticket,
                    });
                    *trades_today += 1;
                    log::info!(
                        "[{}] SCALE {} @ {:.5} with {:.2} lots, ticket={}",
                        slot,
                        direction,
                        level,
                        lot_size,
                        ticket
                    );
                    tg.notify_trade_open(slot, direction, lot_size, level, tp_price)
                        .await;
                }
                Err(e) => {
                    // The engine already consumed the level: the live book
                    // runs lighter than the simulation when the gateway
                    // rejects an order.
                    log::error!("[{}] order placement failed: {}", slot, e);
                    tg.notify_risk_alert(&format!("[{}] order placement failed: {}", slot, e))
                        .await;
                }
            }
        }
        SessionEvent::Closed {
            price,
            reason,
            time,
        } => {
            log::info!("[{}] closing all open positions ({})", slot, reason);
            for tracked in session.book.drain(..) {
                if let Err(e) = broker
                    .close_position(
                        SYMBOL,
                        tracked.pos.direction,
                        tracked.pos.lot_size,
                        tracked.ticket,
                    )
                    .await
                {
                    log::error!(
                        "[{}] close failed for ticket {}: {}",
                        slot,
                        tracked.ticket,
                        e
                    );
                    tg.notify_risk_alert(&format!(
                        "[{}] close failed for ticket {}: {}",
                        slot, tracked.ticket, e
                    ))
                    .await;
                }
                let pnl = ledger.close(tracked.pos.id, price, time, reason);
                tg.notify_trade_close(
                    slot,
                    tracked.pos.direction,
                    tracked.pos.entry_price,
                    price,
                    pnl,
                    reason,
                )
                .await;
            }
        }
    }
}
