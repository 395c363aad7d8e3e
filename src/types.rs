use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candle {
    /// Epoch milliseconds (candle open time, broker server clock = UTC).
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn datetime(&self) -> NaiveDateTime {
        DateTime::from_timestamp_millis(self.timestamp)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default()
    }

    pub fn date(&self) -> NaiveDate {
        self.datetime().date()
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.datetime().time()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn flipped(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1 for Long, -1 for Short. Used to sign price distances.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionSlot {
    Morning,
    Afternoon,
}

impl std::fmt::Display for SessionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionSlot::Morning => write!(f, "MORNING"),
            SessionSlot::Afternoon => write!(f, "AFTERNOON"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeKind {
    Initial,
    Scale,
    Reversal,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Initial => write!(f, "INITIAL"),
            TradeKind::Scale => write!(f, "SCALE"),
            TradeKind::Reversal => write!(f, "REVERSAL"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    Tp,
    Reversal,
    TimeExit,
    SessionEnd,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Tp => write!(f, "TP"),
            ExitReason::Reversal => write!(f, "REVERSAL"),
            ExitReason::TimeExit => write!(f, "TIME_EXIT"),
            ExitReason::SessionEnd => write!(f, "SESSION_END"),
        }
    }
}

/// One position in the ledger. Created open; closed exactly once, then
/// immutable.
#[derive(Clone, Debug, Serialize)]
pub struct Trade {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub lot_size: f64,
    pub tp_price: f64,
    pub kind: TradeKind,
    pub slot: SessionSlot,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_reason: Option<ExitReason>,
    pub profit: Option<f64>,
    pub pips: Option<f64>,
}

impl Trade {
    pub fn is_closed(&self) -> bool {
        self.exit_reason.is_some()
    }
}

/// High/low band over a session's setup window.
#[derive(Clone, Copy, Debug)]
pub struct Range {
    pub high: f64,
    pub low: f64,
    pub candle_count: usize,
}

impl Range {
    pub fn size(&self) -> f64 {
        self.high - self.low
    }
}
