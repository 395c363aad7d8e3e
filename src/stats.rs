use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::drawdown::SessionDrawdowns;
use crate::types::{SessionSlot, Trade};

/// One end-of-day account snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct DailyEquity {
    pub date: NaiveDate,
    pub weekday: String,
    pub balance: f64,
    pub daily_profit: f64,
    pub trades_closed: usize,
}

/// Daily equity with the running maximum and drawdown attached.
#[derive(Clone, Debug, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub weekday: String,
    pub balance: f64,
    pub daily_profit: f64,
    pub trades_closed: usize,
    pub cumulative_max: f64,
    pub drawdown: f64,
    pub drawdown_pct: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_profit: f64,
    pub return_pct: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub avg_pips_per_trade: f64,
    pub morning_max_session_dd: f64,
    pub morning_avg_session_dd: f64,
    pub afternoon_max_session_dd: f64,
    pub afternoon_avg_session_dd: f64,
    pub worst_session_dd: f64,
    /// 3× safety margin over the worst single-session drawdown.
    pub recommended_starting_balance: f64,
    /// initial_balance / recommended_starting_balance.
    pub safe_size_scalar: f64,
    pub safe_lot_size: f64,
}

/// One row of a grouped breakdown (weekday, month, slot, kind, exit reason).
#[derive(Clone, Debug, Serialize)]
pub struct GroupRow {
    pub label: String,
    pub total_profit: f64,
    pub avg_profit: f64,
    pub trade_count: usize,
    pub win_rate: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub weekday_stats: Vec<GroupRow>,
    pub monthly_stats: Vec<GroupRow>,
    pub session_stats: Vec<GroupRow>,
    pub trade_kind_stats: Vec<GroupRow>,
    pub exit_reason_stats: Vec<GroupRow>,
    pub equity_curve: Vec<EquityPoint>,
}

const WEEKDAY_ORDER: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

fn group_rows(
    trades: &[&Trade],
    labels: Vec<String>,
    key: impl Fn(&Trade) -> String,
) -> Vec<GroupRow> {
    labels
        .into_iter()
        .filter_map(|label| {
            let profits: Vec<f64> = trades
                .iter()
                .filter(|t| key(t) == label)
                .map(|t| t.profit.unwrap_or(0.0))
                .collect();
            if profits.is_empty() {
                return None;
            }
            let total: f64 = profits.iter().sum();
            let wins = profits.iter().filter(|&&p| p > 0.0).count();
            Some(GroupRow {
                label,
                total_profit: total,
                avg_profit: total / profits.len() as f64,
                trade_count: profits.len(),
                win_rate: wins as f64 / profits.len() as f64 * 100.0,
            })
        })
        .collect()
}

/// Distinct labels in first-seen order.
fn seen_labels(trades: &[&Trade], key: impl Fn(&Trade) -> String) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for t in trades {
        let label = key(t);
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Build the full post-run report. `None` when no trade was closed — the
/// caller reports "no trades executed" instead of a zeroed table.
pub fn build_report(
    initial_balance: f64,
    base_lot: f64,
    all_trades: &[Trade],
    daily_equity: &[DailyEquity],
    session_dd: &SessionDrawdowns,
) -> Option<Report> {
    let closed: Vec<&Trade> = all_trades.iter().filter(|t| t.is_closed()).collect();
    if closed.is_empty() {
        return None;
    }

    let profits: Vec<f64> = closed.iter().map(|t| t.profit.unwrap_or(0.0)).collect();
    let total_trades = closed.len();
    let winning = profits.iter().filter(|&&p| p > 0.0).count();
    let losing = profits.iter().filter(|&&p| p < 0.0).count();
    let breakeven = total_trades - winning - losing;

    let total_profit: f64 = profits.iter().sum();
    let gross_profit: f64 = profits.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = profits.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();

    let avg_win = if winning > 0 {
        gross_profit / winning as f64
    } else {
        0.0
    };
    let avg_loss = if losing > 0 {
        -gross_loss / losing as f64
    } else {
        0.0
    };
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        f64::INFINITY
    };

    let avg_pips = closed.iter().map(|t| t.pips.unwrap_or(0.0)).sum::<f64>() / total_trades as f64;

    // Account-level drawdown over end-of-day balances.
    let mut cumulative_max = f64::NEG_INFINITY;
    let mut max_drawdown = 0.0_f64;
    let mut max_drawdown_pct = 0.0_f64;
    let equity_curve: Vec<EquityPoint> = daily_equity
        .iter()
        .map(|day| {
            cumulative_max = cumulative_max.max(day.balance);
            let drawdown = day.balance - cumulative_max;
            let drawdown_pct = drawdown / cumulative_max * 100.0;
            max_drawdown = max_drawdown.min(drawdown);
            max_drawdown_pct = max_drawdown_pct.min(drawdown_pct);
            EquityPoint {
                date: day.date,
                weekday: day.weekday.clone(),
                balance: day.balance,
                daily_profit: day.daily_profit,
                trades_closed: day.trades_closed,
                cumulative_max,
                drawdown,
                drawdown_pct,
            }
        })
        .collect();

    let worst_session_dd = session_dd.worst_overall();
    let recommended = if worst_session_dd < 0.0 {
        worst_session_dd.abs() * 3.0
    } else {
        initial_balance
    };
    let safe_size_scalar = if recommended > 0.0 {
        initial_balance / recommended
    } else {
        1.0
    };

    let summary = Summary {
        initial_balance,
        final_balance: initial_balance + total_profit,
        total_profit,
        return_pct: total_profit / initial_balance * 100.0,
        total_trades,
        winning_trades: winning,
        losing_trades: losing,
        breakeven_trades: breakeven,
        win_rate: winning as f64 / total_trades as f64 * 100.0,
        avg_win,
        avg_loss,
        profit_factor,
        gross_profit,
        gross_loss,
        max_drawdown,
        max_drawdown_pct,
        avg_pips_per_trade: avg_pips,
        morning_max_session_dd: session_dd.worst(SessionSlot::Morning),
        morning_avg_session_dd: session_dd.mean(SessionSlot::Morning),
        afternoon_max_session_dd: session_dd.worst(SessionSlot::Afternoon),
        afternoon_avg_session_dd: session_dd.mean(SessionSlot::Afternoon),
        worst_session_dd,
        recommended_starting_balance: recommended,
        safe_size_scalar,
        safe_lot_size: base_lot * safe_size_scalar,
    };

    let weekday_labels: Vec<String> = WEEKDAY_ORDER.iter().map(weekday_name).collect();
    let weekday_stats = group_rows(&closed, weekday_labels, |t| {
        weekday_name(&t.entry_time.weekday())
    });

    let month_key = |t: &Trade| format!("{:04}-{:02}", t.entry_time.year(), t.entry_time.month());
    let mut month_labels = seen_labels(&closed, month_key);
    month_labels.sort();
    let monthly_stats = group_rows(&closed, month_labels, month_key);

    let session_stats = group_rows(
        &closed,
        vec!["MORNING".into(), "AFTERNOON".into()],
        |t| t.slot.to_string(),
    );
    let trade_kind_stats = group_rows(
        &closed,
        seen_labels(&closed, |t| t.kind.to_string()),
        |t| t.kind.to_string(),
    );
    let exit_reason_stats = group_rows(
        &closed,
        seen_labels(&closed, |t| {
            t.exit_reason.map(|r| r.to_string()).unwrap_or_default()
        }),
        |t| t.exit_reason.map(|r| r.to_string()).unwrap_or_default(),
    );

    Some(Report {
        summary,
        weekday_stats,
        monthly_stats,
        session_stats,
        trade_kind_stats,
        exit_reason_stats,
        equity_curve,
    })
}

fn weekday_name(day: &Weekday) -> String {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, ExitReason, SessionSlot, TradeKind};
    use chrono::NaiveDate;

    fn closed_trade(
        day: u32,
        slot: SessionSlot,
        reason: ExitReason,
        profit: f64,
        pips: f64,
    ) -> Trade {
        let entry = NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        Trade {
            direction: Direction::Long,
            entry_price: 1.10125,
            entry_time: entry,
            lot_size: 0.04,
            tp_price: 1.11180,
            kind: TradeKind::Scale,
            slot,
            exit_price: Some(1.11180),
            exit_time: Some(entry + chrono::Duration::hours(1)),
            exit_reason: Some(reason),
            profit: Some(profit),
            pips: Some(pips),
        }
    }

    fn equity_days(balances: &[f64]) -> Vec<DailyEquity> {
        balances
            .iter()
            .enumerate()
            .map(|(i, &balance)| DailyEquity {
                date: NaiveDate::from_ymd_opt(2024, 3, 4 + i as u32).unwrap(),
                weekday: "Monday".into(),
                balance,
                daily_profit: 0.0,
                trades_closed: 0,
            })
            .collect()
    }

    #[test]
    fn no_closed_trades_yields_none() {
        let dd = SessionDrawdowns::default();
        assert!(build_report(10_000.0, 0.01, &[], &[], &dd).is_none());
    }

    #[test]
    fn summary_counts_and_profit_factor() {
        let trades = vec![
            closed_trade(4, SessionSlot::Morning, ExitReason::Tp, 30.0, 30.0),
            closed_trade(4, SessionSlot::Morning, ExitReason::Reversal, -10.0, -10.0),
            closed_trade(5, SessionSlot::Afternoon, ExitReason::Tp, 20.0, 20.0),
            closed_trade(5, SessionSlot::Afternoon, ExitReason::TimeExit, 0.0, 0.0),
        ];
        let dd = SessionDrawdowns::default();
        let report = build_report(
            10_000.0,
            0.01,
            &trades,
            &equity_days(&[10_020.0, 10_040.0]),
            &dd,
        )
        .unwrap();

        let s = &report.summary;
        assert_eq!(s.total_trades, 4);
        assert_eq!(s.winning_trades, 2);
        assert_eq!(s.losing_trades, 1);
        assert_eq!(s.breakeven_trades, 1);
        assert!((s.win_rate - 50.0).abs() < 1e-9);
        assert!((s.gross_profit - 50.0).abs() < 1e-9);
        assert!((s.gross_loss - 10.0).abs() < 1e-9);
        assert!((s.profit_factor - 5.0).abs() < 1e-9);
        assert!((s.total_profit - 40.0).abs() < 1e-9);
        assert!((s.final_balance - 10_040.0).abs() < 1e-9);
        assert!((s.avg_win - 25.0).abs() < 1e-9);
        assert!((s.avg_loss + 10.0).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_is_infinite_without_losses() {
        let trades = vec![closed_trade(4, SessionSlot::Morning, ExitReason::Tp, 30.0, 30.0)];
        let dd = SessionDrawdowns::default();
        let report =
            build_report(10_000.0, 0.01, &trades, &equity_days(&[10_030.0]), &dd).unwrap();
        assert!(report.summary.profit_factor.is_infinite());
    }

    #[test]
    fn recommended_capital_is_three_times_worst_session() {
        let trades = vec![closed_trade(4, SessionSlot::Morning, ExitReason::Tp, 30.0, 30.0)];
        let mut dd = SessionDrawdowns::default();
        dd.record(SessionSlot::Morning, -120.0);
        dd.record(SessionSlot::Afternoon, -200.0);
        let report =
            build_report(10_000.0, 0.01, &trades, &equity_days(&[10_030.0]), &dd).unwrap();

        let s = &report.summary;
        assert!((s.worst_session_dd + 200.0).abs() < 1e-9);
        assert!((s.recommended_starting_balance - 600.0).abs() < 1e-9);
        assert!((s.safe_size_scalar - 10_000.0 / 600.0).abs() < 1e-9);
        assert!((s.safe_lot_size - 0.01 * 10_000.0 / 600.0).abs() < 1e-9);
    }

    #[test]
    fn equity_curve_tracks_running_max_and_drawdown() {
        let trades = vec![closed_trade(4, SessionSlot::Morning, ExitReason::Tp, 30.0, 30.0)];
        let dd = SessionDrawdowns::default();
        let report = build_report(
            10_000.0,
            0.01,
            &trades,
            &equity_days(&[10_100.0, 10_050.0, 10_200.0]),
            &dd,
        )
        .unwrap();

        let curve = &report.equity_curve;
        assert!((curve[0].drawdown - 0.0).abs() < 1e-9);
        assert!((curve[1].cumulative_max - 10_100.0).abs() < 1e-9);
        assert!((curve[1].drawdown + 50.0).abs() < 1e-9);
        assert!((curve[2].cumulative_max - 10_200.0).abs() < 1e-9);
        assert!((report.summary.max_drawdown + 50.0).abs() < 1e-9);
        assert!((report.summary.max_drawdown_pct + 50.0 / 10_100.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn breakdowns_group_by_slot_and_reason() {
        let trades = vec![
            closed_trade(4, SessionSlot::Morning, ExitReason::Tp, 30.0, 30.0),
            closed_trade(4, SessionSlot::Afternoon, ExitReason::Reversal, -10.0, -10.0),
            closed_trade(5, SessionSlot::Morning, ExitReason::Tp, 10.0, 10.0),
        ];
        let dd = SessionDrawdowns::default();
        let report = build_report(
            10_000.0,
            0.01,
            &trades,
            &equity_days(&[10_020.0, 10_030.0]),
            &dd,
        )
        .unwrap();

        let morning = report
            .session_stats
            .iter()
            .find(|r| r.label == "MORNING")
            .unwrap();
        assert_eq!(morning.trade_count, 2);
        assert!((morning.total_profit - 40.0).abs() < 1e-9);
        assert!((morning.win_rate - 100.0).abs() < 1e-9);

        let tp = report
            .exit_reason_stats
            .iter()
            .find(|r| r.label == "TP")
            .unwrap();
        assert_eq!(tp.trade_count, 2);

        // March 2024 entries all land in one month bucket.
        assert_eq!(report.monthly_stats.len(), 1);
        assert_eq!(report.monthly_stats[0].label, "2024-03");
        assert_eq!(report.monthly_stats[0].trade_count, 3);

        // All test entries are Mondays/Tuesdays; weekday rows only exist
        // for days that traded.
        assert!(report
            .weekday_stats
            .iter()
            .all(|r| r.trade_count > 0));
    }
}
