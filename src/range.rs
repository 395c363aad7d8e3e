use chrono::NaiveTime;

use crate::config::MIN_RANGE_CANDLES;
use crate::types::{Candle, Range};

/// Compute the high/low band over the candles whose time-of-day falls in
/// `[start, end)`.
///
/// Returns `None` when the window holds fewer than `MIN_RANGE_CANDLES`
/// candles — a data gap, not an error; the caller skips the session for
/// that day.
pub fn compute_range(day_candles: &[Candle], start: NaiveTime, end: NaiveTime) -> Option<Range> {
    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    let mut count = 0usize;

    for candle in day_candles {
        let t = candle.time_of_day();
        if t >= start && t < end {
            high = high.max(candle.high);
            low = low.min(candle.low);
            count += 1;
        }
    }

    if count < MIN_RANGE_CANDLES {
        return None;
    }

    Some(Range {
        high,
        low,
        candle_count: count,
    })
}
