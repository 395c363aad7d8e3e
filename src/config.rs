use chrono::NaiveTime;

use crate::types::SessionSlot;

// ─── Broker gateway ───────────────────────────────────────────────────────────
pub const BROKER_REST_URL: &str = "https://gateway-demo.rangetrader.io";
// BROKER_API_KEY, BROKER_API_SECRET, TELEGRAM_TOKEN, TELEGRAM_CHAT_ID
// are read from environment variables at runtime (see .env.example)

// ─── Instrument ───────────────────────────────────────────────────────────────
pub const SYMBOL: &str = "XAUUSD";
/// Smallest quoted price increment (5-digit pricing).
pub const POINT: f64 = 0.00001;
/// Points per pip (5-digit broker: 1 pip = 10 points).
pub const POINTS_PER_PIP: f64 = 10.0;
/// Dollars per pip for a full 1.0 lot ($1 per pip per 0.01 lot).
pub const PIP_VALUE_PER_LOT: f64 = 100.0;

// ─── Strategy ─────────────────────────────────────────────────────────────────
/// Base lot size; ladder entries apply a multiplier on top of this.
pub const LOT_SIZE: f64 = 0.01;
/// Take-profit distance from the breakout close, in points.
pub const TP_UNITS: f64 = 580.0;

/// Pullback ladder as fractions of range size, measured from the breakout
/// side of the range. First entry is the deepest retracement.
pub const SCALE_LEVELS: &[f64] = &[0.75, 0.50, 0.25];
/// Lot multipliers per ladder slot: deepest pullback gets the most size.
pub const SCALE_LOT_MULTIPLIERS: &[f64] = &[4.0, 3.0, 2.0];
/// After a reversal the ladder collapses to a single level ...
pub const REVERSAL_SCALE_LEVEL: f64 = 0.50;
/// ... carrying a fixed larger size.
pub const REVERSAL_LOT_MULTIPLIER: f64 = 4.0;

/// A session stops opening positions for the day at this many reversals.
pub const MAX_REVERSALS: u8 = 2;
/// A setup window with fewer candles than this yields no range and the
/// session is skipped for the day.
pub const MIN_RANGE_CANDLES: usize = 3;

// ─── Session clock (broker server time) ───────────────────────────────────────
const MORNING_RANGE_START: (u32, u32) = (10, 0);
const MORNING_RANGE_END: (u32, u32) = (10, 15);
const MORNING_ENTRY_START: (u32, u32) = (10, 15);
const MORNING_ENTRY_CUTOFF: (u32, u32) = (16, 29);

const AFTERNOON_RANGE_START: (u32, u32) = (16, 30);
const AFTERNOON_RANGE_END: (u32, u32) = (16, 45);
const AFTERNOON_ENTRY_START: (u32, u32) = (16, 45);
const AFTERNOON_EXIT_TIME: (u32, u32) = (23, 55);

// ─── Bot settings ─────────────────────────────────────────────────────────────
/// Candle timeframe in minutes, as the gateway expects it.
pub const TIMEFRAME_MIN: &str = "5";
/// Seconds between live polls.
pub const POLL_INTERVAL_SECS: u64 = 10;
/// Candles fetched per live poll.
pub const LIVE_CANDLE_COUNT: usize = 100;

// ─── Backtest settings ────────────────────────────────────────────────────────
pub const INITIAL_BALANCE: f64 = 10_000.0;

/// Session-slot clock boundaries for one trading day.
#[derive(Clone, Copy, Debug)]
pub struct SlotConfig {
    pub slot: SessionSlot,
    /// Setup window, half-open: [range_start, range_end).
    pub range_start: NaiveTime,
    pub range_end: NaiveTime,
    /// Candles earlier than this are not fed to the engine.
    pub entry_start: NaiveTime,
    /// Last time-of-day (inclusive) at which new entries may arm/trigger.
    pub entry_cutoff: NaiveTime,
    /// Hard end-of-day boundary: everything still open force-closes here.
    pub force_exit: Option<NaiveTime>,
}

fn hm((h, m): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid session time")
}

pub fn slot_config(slot: SessionSlot) -> SlotConfig {
    match slot {
        SessionSlot::Morning => SlotConfig {
            slot,
            range_start: hm(MORNING_RANGE_START),
            range_end: hm(MORNING_RANGE_END),
            entry_start: hm(MORNING_ENTRY_START),
            entry_cutoff: hm(MORNING_ENTRY_CUTOFF),
            force_exit: None,
        },
        SessionSlot::Afternoon => SlotConfig {
            slot,
            range_start: hm(AFTERNOON_RANGE_START),
            range_end: hm(AFTERNOON_RANGE_END),
            entry_start: hm(AFTERNOON_ENTRY_START),
            // The forced exit preempts the cutoff; entries stay allowed
            // right up to it.
            entry_cutoff: hm(AFTERNOON_EXIT_TIME),
            force_exit: Some(hm(AFTERNOON_EXIT_TIME)),
        },
    }
}
