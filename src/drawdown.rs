use crate::ledger::{floating_pnl, OpenPosition};
use crate::types::{Candle, SessionSlot};

/// Floating-equity high-water mark and worst excursion for one session
/// instance.
///
/// Equity is sampled at the candle high, low and close, in that order, so
/// the intracandle worst point for the open direction is captured. The peak
/// only advances on the close sample — an intracandle spike that never
/// closes favorably must not raise the bar the drawdown is measured from.
pub struct DrawdownTracker {
    point: f64,
    peak_equity: f64,
    max_drawdown: f64,
}

impl DrawdownTracker {
    pub fn new(start_balance: f64, point: f64) -> Self {
        DrawdownTracker {
            point,
            peak_equity: start_balance,
            max_drawdown: 0.0,
        }
    }

    /// Sample one candle. Call only while the session has open positions,
    /// after the candle's opens/closes have been applied to the ledger.
    pub fn observe(&mut self, candle: &Candle, open: &[OpenPosition], balance: f64) {
        for price in [candle.high, candle.low, candle.close] {
            let equity = balance + floating_pnl(open, price, self.point);
            if price == candle.close && equity > self.peak_equity {
                self.peak_equity = equity;
            }
            let drawdown = equity - self.peak_equity;
            if drawdown < self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    /// Most negative equity − peak seen this session (≤ 0).
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }
}

/// Per-slot drawdown history across a whole run. Only sessions that
/// actually went under water are recorded.
#[derive(Default)]
pub struct SessionDrawdowns {
    morning: Vec<f64>,
    afternoon: Vec<f64>,
}

impl SessionDrawdowns {
    pub fn record(&mut self, slot: SessionSlot, max_drawdown: f64) {
        if max_drawdown < 0.0 {
            match slot {
                SessionSlot::Morning => self.morning.push(max_drawdown),
                SessionSlot::Afternoon => self.afternoon.push(max_drawdown),
            }
        }
    }

    fn slot_values(&self, slot: SessionSlot) -> &[f64] {
        match slot {
            SessionSlot::Morning => &self.morning,
            SessionSlot::Afternoon => &self.afternoon,
        }
    }

    /// Most negative per-day drawdown of the slot, 0 when none recorded.
    pub fn worst(&self, slot: SessionSlot) -> f64 {
        self.slot_values(slot)
            .iter()
            .copied()
            .fold(0.0_f64, f64::min)
    }

    pub fn mean(&self, slot: SessionSlot) -> f64 {
        let values = self.slot_values(slot);
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Worst single-session drawdown across both slots.
    pub fn worst_overall(&self) -> f64 {
        self.worst(SessionSlot::Morning)
            .min(self.worst(SessionSlot::Afternoon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::POINT;
    use crate::types::Direction;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    fn long_pos(entry: f64, lot: f64) -> OpenPosition {
        OpenPosition {
            id: 0,
            direction: Direction::Long,
            entry_price: entry,
            lot_size: lot,
        }
    }

    #[test]
    fn trough_comes_from_intracandle_low() {
        let mut tracker = DrawdownTracker::new(10_000.0, POINT);
        let open = [long_pos(1.10000, 0.01)];
        // Close is flat but the low dipped 10 pips: -$10 on 0.01 lot.
        tracker.observe(&candle(1.10010, 1.09900, 1.10000), &open, 10_000.0);
        assert!((tracker.max_drawdown() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn peak_advances_on_close_sample_only() {
        let mut tracker = DrawdownTracker::new(10_000.0, POINT);
        let open = [long_pos(1.10000, 0.01)];
        // High spikes +20 pips but the close is flat: peak must not move.
        tracker.observe(&candle(1.10200, 1.10000, 1.10000), &open, 10_000.0);
        assert!((tracker.peak_equity() - 10_000.0).abs() < 1e-9);

        // A favorable close does move it (+10 pips = +$10).
        tracker.observe(&candle(1.10110, 1.10000, 1.10100), &open, 10_000.0);
        assert!((tracker.peak_equity() - 10_010.0).abs() < 1e-9);

        // Drawdown is then measured from the new peak.
        tracker.observe(&candle(1.10100, 1.10000, 1.10050), &open, 10_000.0);
        assert!((tracker.max_drawdown() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn aggregates_worst_and_mean_per_slot() {
        let mut dd = SessionDrawdowns::default();
        dd.record(SessionSlot::Morning, -10.0);
        dd.record(SessionSlot::Morning, -30.0);
        dd.record(SessionSlot::Morning, 0.0); // flat session, not recorded
        dd.record(SessionSlot::Afternoon, -50.0);

        assert!((dd.worst(SessionSlot::Morning) + 30.0).abs() < 1e-9);
        assert!((dd.mean(SessionSlot::Morning) + 20.0).abs() < 1e-9);
        assert!((dd.worst(SessionSlot::Afternoon) + 50.0).abs() < 1e-9);
        assert!((dd.worst_overall() + 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_slot_reports_zero() {
        let dd = SessionDrawdowns::default();
        assert_eq!(dd.worst(SessionSlot::Morning), 0.0);
        assert_eq!(dd.mean(SessionSlot::Afternoon), 0.0);
        assert_eq!(dd.worst_overall(), 0.0);
    }
}
