use chrono::NaiveDateTime;

use crate::config::{
    SlotConfig, MAX_REVERSALS, POINT, REVERSAL_LOT_MULTIPLIER, REVERSAL_SCALE_LEVEL, SCALE_LEVELS,
    SCALE_LOT_MULTIPLIERS, TP_UNITS,
};
use crate::ledger::OpenPosition;
use crate::types::{Candle, Direction, ExitReason, Range, SessionSlot, TradeKind};

/// Why a session stopped for the day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// Second opposite-direction close: positions flat, no more entries.
    SecondReversal,
    /// Reversal detected past the entry cutoff: positions flat, no re-arm.
    ReversalAfterCutoff,
    /// Hard end-of-day boundary reached.
    TimeExit,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::SecondReversal => write!(f, "second reversal"),
            TerminationReason::ReversalAfterCutoff => write!(f, "reversal after cutoff"),
            TerminationReason::TimeExit => write!(f, "time exit"),
        }
    }
}

/// Typed engine output, consumed by the drivers (ledger/broker application)
/// and by logging. `ScaleTriggered` and `Closed` are the actionable ones:
/// the first opens a position, the second closes everything the session has
/// open at that point.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    RangeSet {
        high: f64,
        low: f64,
    },
    BreakoutArmed {
        direction: Direction,
        price: f64,
        tp_price: f64,
        time: NaiveDateTime,
    },
    ScaleTriggered {
        direction: Direction,
        level: f64,
        lot_size: f64,
        tp_price: f64,
        kind: TradeKind,
        time: NaiveDateTime,
    },
    Reversed {
        direction: Direction,
        price: f64,
        tp_price: f64,
        count: u8,
        time: NaiveDateTime,
    },
    Closed {
        price: f64,
        reason: ExitReason,
        time: NaiveDateTime,
    },
    Terminated {
        reason: TerminationReason,
        time: NaiveDateTime,
    },
}

/// Per-(day, slot) breakout state machine.
///
/// One instance lives for exactly one trading day of one slot; the drivers
/// construct fresh instances each day. Candle processing order is a fixed
/// contract: forced exit, take-profit, initial breakout, scale ladder,
/// reversal. Reordering changes outcomes — a candle that sweeps through
/// ladder levels and closes beyond the opposite boundary must open those
/// scale positions before the reversal closes them.
pub struct SessionEngine {
    cfg: SlotConfig,
    base_lot: f64,
    range: Option<Range>,
    direction: Option<Direction>,
    breakout_price: Option<f64>,
    tp_price: Option<f64>,
    reversal_count: u8,
    scale_levels: Vec<f64>,
    triggered_levels: Vec<f64>,
    breakout_candle_ts: Option<i64>,
    initial_breakout_done: bool,
    terminated: Option<TerminationReason>,
}

impl SessionEngine {
    pub fn new(cfg: SlotConfig, base_lot: f64) -> Self {
        SessionEngine {
            cfg,
            base_lot,
            range: None,
            direction: None,
            breakout_price: None,
            tp_price: None,
            reversal_count: 0,
            scale_levels: Vec::new(),
            triggered_levels: Vec::new(),
            breakout_candle_ts: None,
            initial_breakout_done: false,
            terminated: None,
        }
    }

    pub fn slot(&self) -> SessionSlot {
        self.cfg.slot
    }

    pub fn has_range(&self) -> bool {
        self.range.is_some()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn tp_price(&self) -> Option<f64> {
        self.tp_price
    }

    pub fn reversal_count(&self) -> u8 {
        self.reversal_count
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_some()
    }

    /// Seed the reference range. Must happen before any candle is processed;
    /// without it the engine ignores everything.
    pub fn set_range(&mut self, range: Range) -> SessionEvent {
        self.range = Some(range);
        SessionEvent::RangeSet {
            high: range.high,
            low: range.low,
        }
    }

    fn tp_for(direction: Direction, breakout_price: f64) -> f64 {
        breakout_price + direction.sign() * TP_UNITS * POINT
    }

    /// Ladder prices measured from the breakout side of the range into it.
    fn ladder(range: Range, direction: Direction, percentages: &[f64]) -> Vec<f64> {
        percentages
            .iter()
            .map(|pct| match direction {
                Direction::Long => range.high - pct * range.size(),
                Direction::Short => range.low + pct * range.size(),
            })
            .collect()
    }

    fn arm(&mut self, direction: Direction, breakout_price: f64, range: Range) {
        self.direction = Some(direction);
        self.breakout_price = Some(breakout_price);
        self.tp_price = Some(Self::tp_for(direction, breakout_price));
        self.scale_levels = Self::ladder(range, direction, SCALE_LEVELS);
    }

    fn arm_reversal(&mut self, direction: Direction, reversal_price: f64, range: Range) {
        self.direction = Some(direction);
        self.breakout_price = Some(reversal_price);
        self.tp_price = Some(Self::tp_for(direction, reversal_price));
        self.scale_levels = Self::ladder(range, direction, &[REVERSAL_SCALE_LEVEL]);
        // New direction epoch: the 50% price may coincide with a consumed
        // level of the old ladder, but it belongs to the opposite side now.
        self.triggered_levels.clear();
    }

    fn terminate(&mut self, reason: TerminationReason, time: NaiveDateTime, out: &mut Vec<SessionEvent>) {
        self.terminated = Some(reason);
        self.direction = None;
        out.push(SessionEvent::Terminated { reason, time });
    }

    /// Process one candle. `open` is the session's current position book;
    /// the driver applies the returned events to it in order.
    ///
    /// Only candles at or after `entry_start` belong here; earlier candles
    /// exist solely for the range window.
    pub fn on_candle(&mut self, candle: &Candle, open: &[OpenPosition]) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.terminated.is_some() {
            return events;
        }
        let range = match self.range {
            Some(r) => r,
            None => return events,
        };

        let time = candle.datetime();
        let t = candle.time_of_day();

        // Hard end-of-day boundary: flatten and stop, whatever the state.
        if let Some(exit) = self.cfg.force_exit {
            if t >= exit {
                if !open.is_empty() {
                    events.push(SessionEvent::Closed {
                        price: candle.close,
                        reason: ExitReason::TimeExit,
                        time,
                    });
                }
                self.terminate(TerminationReason::TimeExit, time, &mut events);
                return events;
            }
        }

        let can_enter = t <= self.cfg.entry_cutoff;
        let mut book_closed = false;
        let mut opened_this_candle = 0usize;

        // 1. Take-profit: all session positions share the epoch TP and
        //    close together at the TP price. The session keeps monitoring —
        //    untriggered levels and the reversal stay live.
        if let (Some(direction), Some(tp)) = (self.direction, self.tp_price) {
            if !open.is_empty() {
                let hit = match direction {
                    Direction::Long => candle.high >= tp,
                    Direction::Short => candle.low <= tp,
                };
                if hit {
                    events.push(SessionEvent::Closed {
                        price: tp,
                        reason: ExitReason::Tp,
                        time,
                    });
                    book_closed = true;
                }
            }
        }

        // 2. Initial breakout: arms the direction once per day. No position
        //    opens on the breakout candle itself — only later candles may
        //    trigger ladder entries.
        if !self.initial_breakout_done && can_enter {
            let armed = if candle.close > range.high {
                Some(Direction::Long)
            } else if candle.close < range.low {
                Some(Direction::Short)
            } else {
                None
            };
            if let Some(direction) = armed {
                self.arm(direction, candle.close, range);
                self.breakout_candle_ts = Some(candle.timestamp);
                self.initial_breakout_done = true;
                events.push(SessionEvent::BreakoutArmed {
                    direction,
                    price: candle.close,
                    tp_price: self.tp_price.unwrap_or_default(),
                    time,
                });
            }
        }

        if let Some(direction) = self.direction {
            // 3. Scale ladder, before the reversal check: a candle that
            //    sweeps several levels and still closes beyond the opposite
            //    boundary opens all those positions first.
            let past_breakout_candle = self
                .breakout_candle_ts
                .map_or(true, |ts| candle.timestamp > ts);
            if past_breakout_candle {
                let tp_price = self.tp_price.unwrap_or_default();
                for idx in 0..self.scale_levels.len() {
                    let level = self.scale_levels[idx];
                    if self.triggered_levels.contains(&level) {
                        continue;
                    }
                    let hit = match direction {
                        Direction::Long => candle.low <= level,
                        Direction::Short => candle.high >= level,
                    };
                    if !hit {
                        continue;
                    }
                    if !can_enter {
                        // Past the cutoff the level is skipped but not
                        // consumed; the cutoff is monotone so it cannot
                        // fire again today anyway.
                        continue;
                    }
                    let lot_size = if self.reversal_count >= 1 {
                        self.base_lot * REVERSAL_LOT_MULTIPLIER
                    } else {
                        self.base_lot * SCALE_LOT_MULTIPLIERS[idx]
                    };
                    // Consumed at emission time, independent of whether the
                    // order collaborator accepts the order.
                    self.triggered_levels.push(level);
                    opened_this_candle += 1;
                    events.push(SessionEvent::ScaleTriggered {
                        direction,
                        level,
                        lot_size,
                        tp_price,
                        kind: TradeKind::Scale,
                        time,
                    });
                }
            }

            // 4. Reversal: close beyond the opposite boundary while armed.
            let new_direction = match direction {
                Direction::Long if candle.close < range.low => Some(Direction::Short),
                Direction::Short if candle.close > range.high => Some(Direction::Long),
                _ => None,
            };
            if let Some(new_direction) = new_direction {
                let has_open = (!open.is_empty() && !book_closed) || opened_this_candle > 0;
                if has_open {
                    events.push(SessionEvent::Closed {
                        price: candle.close,
                        reason: ExitReason::Reversal,
                        time,
                    });
                }
                if !can_enter {
                    self.terminate(TerminationReason::ReversalAfterCutoff, time, &mut events);
                    return events;
                }
                self.reversal_count += 1;
                if self.reversal_count < MAX_REVERSALS {
                    self.arm_reversal(new_direction, candle.close, range);
                    events.push(SessionEvent::Reversed {
                        direction: new_direction,
                        price: candle.close,
                        tp_price: self.tp_price.unwrap_or_default(),
                        count: self.reversal_count,
                        time,
                    });
                } else {
                    self.terminate(TerminationReason::SecondReversal, time, &mut events);
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{slot_config, LOT_SIZE};
    use chrono::NaiveDate;

    fn candle(h: u32, m: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        Candle {
            timestamp: ts,
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    fn test_range() -> Range {
        Range {
            high: 1.10500,
            low: 1.10000,
            candle_count: 3,
        }
    }

    fn armed_long_engine() -> SessionEngine {
        let mut engine = SessionEngine::new(slot_config(SessionSlot::Morning), LOT_SIZE);
        engine.set_range(test_range());
        let events = engine.on_candle(&candle(10, 20, 1.10450, 1.10650, 1.10400, 1.10600), &[]);
        assert!(matches!(events[0], SessionEvent::BreakoutArmed { .. }));
        engine
    }

    fn positions(specs: &[(Direction, f64, f64)]) -> Vec<OpenPosition> {
        specs
            .iter()
            .enumerate()
            .map(|(id, &(direction, entry_price, lot_size))| OpenPosition {
                id,
                direction,
                entry_price,
                lot_size,
            })
            .collect()
    }

    #[test]
    fn long_breakout_arms_tp_and_ladder() {
        let mut engine = SessionEngine::new(slot_config(SessionSlot::Morning), LOT_SIZE);
        engine.set_range(test_range());
        let events = engine.on_candle(&candle(10, 20, 1.10450, 1.10650, 1.10400, 1.10600), &[]);

        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::BreakoutArmed {
                direction,
                price,
                tp_price,
                ..
            } => {
                assert_eq!(*direction, Direction::Long);
                assert!((price - 1.10600).abs() < 1e-9);
                assert!((tp_price - 1.11180).abs() < 1e-9);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(engine.scale_levels.len(), 3);
        assert!((engine.scale_levels[0] - 1.10125).abs() < 1e-9);
        assert!((engine.scale_levels[1] - 1.10250).abs() < 1e-9);
        assert!((engine.scale_levels[2] - 1.10375).abs() < 1e-9);
    }

    #[test]
    fn no_position_opens_on_breakout_candle() {
        let mut engine = SessionEngine::new(slot_config(SessionSlot::Morning), LOT_SIZE);
        engine.set_range(test_range());
        // The breakout candle's low sweeps through every ladder level.
        let events = engine.on_candle(&candle(10, 20, 1.10450, 1.10650, 1.10050, 1.10600), &[]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::BreakoutArmed { .. }));
    }

    #[test]
    fn shallow_pullback_triggers_one_level_with_smallest_size() {
        let mut engine = armed_long_engine();
        // Low 1.10370 reaches only the shallowest level (1.10375).
        let events = engine.on_candle(&candle(10, 25, 1.10600, 1.10620, 1.10370, 1.10500), &[]);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::ScaleTriggered {
                level, lot_size, ..
            } => {
                assert!((level - 1.10375).abs() < 1e-9);
                assert!((lot_size - LOT_SIZE * 2.0).abs() < 1e-9);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn deep_sweep_triggers_whole_ladder_deepest_heaviest() {
        let mut engine = armed_long_engine();
        let events = engine.on_candle(&candle(10, 25, 1.10600, 1.10620, 1.10100, 1.10300), &[]);
        assert_eq!(events.len(), 3);
        let expected = [(1.10125, 4.0), (1.10250, 3.0), (1.10375, 2.0)];
        for (ev, (want_level, want_mult)) in events.iter().zip(expected) {
            match ev {
                SessionEvent::ScaleTriggered { level, lot_size, .. } => {
                    assert!((level - want_level).abs() < 1e-9);
                    assert!((lot_size - LOT_SIZE * want_mult).abs() < 1e-9);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn levels_never_retrigger_within_an_epoch() {
        let mut engine = armed_long_engine();
        let first = engine.on_candle(&candle(10, 25, 1.10600, 1.10620, 1.10370, 1.10450), &[]);
        assert_eq!(first.len(), 1);
        let book = positions(&[(Direction::Long, 1.10375, 0.02)]);
        // Same level swept again: nothing fires, deeper levels still can.
        let second = engine.on_candle(&candle(10, 30, 1.10450, 1.10460, 1.10360, 1.10420), &book);
        assert!(second.is_empty());
        let third = engine.on_candle(&candle(10, 35, 1.10420, 1.10430, 1.10240, 1.10300), &book);
        assert_eq!(third.len(), 1);
        match &third[0] {
            SessionEvent::ScaleTriggered { level, .. } => {
                assert!((level - 1.10250).abs() < 1e-9)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn tp_hit_closes_all_at_tp_and_keeps_monitoring() {
        let mut engine = armed_long_engine();
        let opened = engine.on_candle(&candle(10, 25, 1.10600, 1.10620, 1.10370, 1.10450), &[]);
        assert_eq!(opened.len(), 1);
        let book = positions(&[(Direction::Long, 1.10375, 0.02)]);

        let events = engine.on_candle(&candle(10, 30, 1.10450, 1.11200, 1.10440, 1.11150), &book);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Closed { price, reason, .. } => {
                assert_eq!(*reason, ExitReason::Tp);
                assert!((price - 1.11180).abs() < 1e-9);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!engine.is_terminated());

        // Remaining ladder levels still trigger afterwards.
        let later = engine.on_candle(&candle(10, 35, 1.11150, 1.11160, 1.10100, 1.10300), &[]);
        assert_eq!(later.len(), 2);
        assert!(later
            .iter()
            .all(|ev| matches!(ev, SessionEvent::ScaleTriggered { .. })));
    }

    #[test]
    fn reversal_closes_flips_and_resets_ladder() {
        let mut engine = armed_long_engine();
        let opened = engine.on_candle(&candle(10, 25, 1.10600, 1.10620, 1.10100, 1.10300), &[]);
        assert_eq!(opened.len(), 3);
        let book = positions(&[
            (Direction::Long, 1.10125, 0.04),
            (Direction::Long, 1.10250, 0.03),
            (Direction::Long, 1.10375, 0.02),
        ]);

        let events = engine.on_candle(&candle(10, 30, 1.10300, 1.10310, 1.09850, 1.09900), &book);
        assert_eq!(events.len(), 2);
        match &events[0] {
            SessionEvent::Closed { price, reason, .. } => {
                assert_eq!(*reason, ExitReason::Reversal);
                assert!((price - 1.09900).abs() < 1e-9);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match &events[1] {
            SessionEvent::Reversed {
                direction,
                price,
                count,
                ..
            } => {
                assert_eq!(*direction, Direction::Short);
                assert!((price - 1.09900).abs() < 1e-9);
                assert_eq!(*count, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(engine.reversal_count(), 1);
        // Single 50% level of the short side, empty triggered set.
        assert_eq!(engine.scale_levels.len(), 1);
        assert!((engine.scale_levels[0] - 1.10250).abs() < 1e-9);
        assert!(engine.triggered_levels.is_empty());

        // The reversal ladder carries the fixed larger multiplier.
        let scaled = engine.on_candle(&candle(10, 35, 1.09900, 1.10260, 1.09880, 1.10100), &[]);
        assert_eq!(scaled.len(), 1);
        match &scaled[0] {
            SessionEvent::ScaleTriggered {
                direction,
                level,
                lot_size,
                ..
            } => {
                assert_eq!(*direction, Direction::Short);
                assert!((level - 1.10250).abs() < 1e-9);
                assert!((lot_size - LOT_SIZE * 4.0).abs() < 1e-9);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn second_reversal_terminates_for_the_day() {
        let mut engine = armed_long_engine();
        // First reversal.
        engine.on_candle(&candle(10, 30, 1.10300, 1.10310, 1.09850, 1.09900), &[]);
        assert_eq!(engine.reversal_count(), 1);
        // Short epoch scales in at the 50% level.
        let opened = engine.on_candle(&candle(10, 35, 1.09900, 1.10260, 1.09880, 1.10100), &[]);
        assert_eq!(opened.len(), 1);
        let book = positions(&[(Direction::Short, 1.10250, 0.04)]);

        // Second opposite close: flat and done.
        let events = engine.on_candle(&candle(10, 40, 1.10100, 1.10700, 1.10090, 1.10650), &book);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            SessionEvent::Closed {
                reason: ExitReason::Reversal,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            SessionEvent::Terminated {
                reason: TerminationReason::SecondReversal,
                ..
            }
        ));
        assert_eq!(engine.reversal_count(), 2);
        assert!(engine.is_terminated());

        // Nothing opens for the rest of the day.
        let after = engine.on_candle(&candle(10, 45, 1.10650, 1.10800, 1.10000, 1.10100), &[]);
        assert!(after.is_empty());
    }

    #[test]
    fn no_breakout_means_no_events_all_day() {
        let mut engine = SessionEngine::new(slot_config(SessionSlot::Morning), LOT_SIZE);
        engine.set_range(test_range());
        for m in 0..30 {
            let events = engine.on_candle(
                &candle(11, m, 1.10200, 1.10400, 1.10100, 1.10300),
                &[],
            );
            assert!(events.is_empty());
        }
        assert!(engine.direction().is_none());
        assert!(!engine.is_terminated());
    }

    #[test]
    fn no_arming_without_a_range() {
        let mut engine = SessionEngine::new(slot_config(SessionSlot::Morning), LOT_SIZE);
        let events = engine.on_candle(&candle(10, 20, 1.10450, 1.10650, 1.10400, 1.10600), &[]);
        assert!(events.is_empty());
        assert!(engine.direction().is_none());
    }

    #[test]
    fn breakout_past_cutoff_does_not_arm() {
        let mut engine = SessionEngine::new(slot_config(SessionSlot::Morning), LOT_SIZE);
        engine.set_range(test_range());
        let events = engine.on_candle(&candle(16, 30, 1.10450, 1.10650, 1.10400, 1.10600), &[]);
        assert!(events.is_empty());
        assert!(engine.direction().is_none());
    }

    #[test]
    fn scale_hit_past_cutoff_is_skipped_not_consumed() {
        let mut engine = armed_long_engine();
        // Past the 16:29 cutoff: the sweep does nothing and consumes nothing.
        let events = engine.on_candle(&candle(16, 30, 1.10500, 1.10510, 1.10100, 1.10450), &[]);
        assert!(events.is_empty());
        assert!(engine.triggered_levels.is_empty());
    }

    #[test]
    fn reversal_past_cutoff_closes_and_terminates() {
        let mut engine = armed_long_engine();
        let opened = engine.on_candle(&candle(10, 25, 1.10600, 1.10620, 1.10370, 1.10450), &[]);
        assert_eq!(opened.len(), 1);
        let book = positions(&[(Direction::Long, 1.10375, 0.02)]);

        let events = engine.on_candle(&candle(16, 35, 1.10450, 1.10460, 1.09850, 1.09900), &book);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            SessionEvent::Closed {
                reason: ExitReason::Reversal,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            SessionEvent::Terminated {
                reason: TerminationReason::ReversalAfterCutoff,
                ..
            }
        ));
        assert_eq!(engine.reversal_count(), 0);
    }

    #[test]
    fn afternoon_force_exit_flattens_and_terminates() {
        let mut engine = SessionEngine::new(slot_config(SessionSlot::Afternoon), LOT_SIZE);
        engine.set_range(test_range());
        engine.on_candle(&candle(16, 50, 1.10450, 1.10650, 1.10400, 1.10600), &[]);
        let opened = engine.on_candle(&candle(16, 55, 1.10600, 1.10620, 1.10370, 1.10450), &[]);
        assert_eq!(opened.len(), 1);
        let book = positions(&[(Direction::Long, 1.10375, 0.02)]);

        let events = engine.on_candle(&candle(23, 55, 1.10450, 1.10460, 1.10440, 1.10455), &book);
        assert_eq!(events.len(), 2);
        match &events[0] {
            SessionEvent::Closed { price, reason, .. } => {
                assert_eq!(*reason, ExitReason::TimeExit);
                assert!((price - 1.10455).abs() < 1e-9);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            events[1],
            SessionEvent::Terminated {
                reason: TerminationReason::TimeExit,
                ..
            }
        ));
    }

    #[test]
    fn sweep_and_reversal_on_one_candle_opens_then_closes() {
        let mut engine = armed_long_engine();
        // One candle dives through the whole ladder and closes below the
        // range: three ScaleTriggered events, then the reversal close.
        let events = engine.on_candle(&candle(10, 25, 1.10600, 1.10620, 1.09850, 1.09900), &[]);
        assert_eq!(events.len(), 5);
        assert!(events[..3]
            .iter()
            .all(|ev| matches!(ev, SessionEvent::ScaleTriggered { .. })));
        assert!(matches!(
            events[3],
            SessionEvent::Closed {
                reason: ExitReason::Reversal,
                ..
            }
        ));
        assert!(matches!(events[4], SessionEvent::Reversed { .. }));
    }

    #[test]
    fn replaying_identical_candles_yields_identical_events() {
        let candles = [
            candle(10, 20, 1.10450, 1.10650, 1.10400, 1.10600),
            candle(10, 25, 1.10600, 1.10620, 1.10100, 1.10300),
            candle(10, 30, 1.10300, 1.10310, 1.09850, 1.09900),
            candle(10, 35, 1.09900, 1.10260, 1.09880, 1.10100),
        ];
        let run = |candles: &[Candle]| -> Vec<String> {
            let mut engine = SessionEngine::new(slot_config(SessionSlot::Morning), LOT_SIZE);
            engine.set_range(test_range());
            let mut log = Vec::new();
            for c in candles {
                for ev in engine.on_candle(c, &[]) {
                    log.push(format!("{:?}", ev));
                }
            }
            log
        };
        assert_eq!(run(&candles), run(&candles));
    }
}
