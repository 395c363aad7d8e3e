/// Range breakout backtester — reads a candle CSV, replays the strategy
/// day by day and prints the full statistics report.
/// Run: cargo run --bin backtest --release -- data/XAUUSD_M5.csv
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use range_trader::config::{INITIAL_BALANCE, LOT_SIZE, SYMBOL};
use range_trader::sim::Backtester;
use range_trader::stats::{GroupRow, Report};
use range_trader::types::{Candle, Trade};

// ── CSV loader ────────────────────────────────────────────────────────────────
// Expected columns: timestamp_ms,open,high,low,close,volume (header row).
fn load_csv(path: &Path) -> Vec<Candle> {
    let file = File::open(path).expect("candle CSV not found");
    let mut out = Vec::with_capacity(100_000);
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        if i == 0 {
            continue;
        }
        let f: Vec<&str> = line.split(',').collect();
        if f.len() < 5 {
            continue;
        }
        out.push(Candle {
            timestamp: f[0].parse().unwrap_or(0),
            open: f[1].parse().unwrap_or(0.0),
            high: f[2].parse().unwrap_or(0.0),
            low: f[3].parse().unwrap_or(0.0),
            close: f[4].parse().unwrap_or(0.0),
            volume: f.get(5).and_then(|v| v.parse().ok()).unwrap_or(0.0),
        });
    }
    out.sort_by_key(|c| c.timestamp);
    out
}

// ── Report printing ───────────────────────────────────────────────────────────

fn print_report(report: &Report) {
    let s = &report.summary;

    println!();
    println!("{}", "═".repeat(80));
    println!("{:^80}", "BACKTEST RESULTS");
    println!("{}", "═".repeat(80));

    println!("\n📊 SUMMARY");
    println!("{}", "─".repeat(80));
    println!("Initial Balance:        ${:>12.2}", s.initial_balance);
    println!("Final Balance:          ${:>12.2}", s.final_balance);
    println!("Total Profit/Loss:      ${:>+12.2}", s.total_profit);
    println!("Return:                 {:>12.2}%", s.return_pct);
    println!(
        "Max Drawdown:           ${:>12.2}  ({:.2}%)",
        s.max_drawdown, s.max_drawdown_pct
    );

    println!("\n📈 TRADE STATISTICS");
    println!("{}", "─".repeat(80));
    println!("Total Trades:           {}", s.total_trades);
    println!(
        "Winning Trades:         {}  ({:.2}%)",
        s.winning_trades, s.win_rate
    );
    println!("Losing Trades:          {}", s.losing_trades);
    println!("Breakeven Trades:       {}", s.breakeven_trades);
    println!("Average Win:            ${:.2}", s.avg_win);
    println!("Average Loss:           ${:.2}", s.avg_loss);
    println!("Profit Factor:          {:.2}", s.profit_factor);
    println!("Gross Profit:           ${:.2}", s.gross_profit);
    println!("Gross Loss:             ${:.2}", s.gross_loss);
    println!("Average Pips/Trade:     {:.1}", s.avg_pips_per_trade);

    println!("\n⚠️  SESSION DRAWDOWN (RISK MANAGEMENT)");
    println!("{}", "═".repeat(80));
    println!("Morning Session:");
    println!("  Max Drawdown:         ${:.2}", s.morning_max_session_dd);
    println!("  Avg Drawdown:         ${:.2}", s.morning_avg_session_dd);
    println!("Afternoon Session:");
    println!("  Max Drawdown:         ${:.2}", s.afternoon_max_session_dd);
    println!("  Avg Drawdown:         ${:.2}", s.afternoon_avg_session_dd);
    println!("\n⚡ WORST SESSION DRAWDOWN: ${:.2}", s.worst_session_dd);
    println!("\n💡 RECOMMENDED SETTINGS:");
    println!(
        "  Minimum Starting Balance:  ${:.2}",
        s.recommended_starting_balance
    );
    println!("  Safe Lot Size:             {:.2}  (with ${:.2})", s.safe_lot_size, s.initial_balance);
    println!("  (3x safety margin against the worst observed session)");
    println!("{}", "═".repeat(80));

    print_group("📅 DAY OF WEEK ANALYSIS", &report.weekday_stats, true);

    if let (Some(best), Some(worst)) = (
        report
            .weekday_stats
            .iter()
            .max_by(|a, b| a.total_profit.total_cmp(&b.total_profit)),
        report
            .weekday_stats
            .iter()
            .min_by(|a, b| a.total_profit.total_cmp(&b.total_profit)),
    ) {
        println!(
            "\n🏆 BEST DAY TO TRADE:   {} (${:+.2})",
            best.label, best.total_profit
        );
        println!(
            "⚠️  WORST DAY TO TRADE:  {} (${:+.2})",
            worst.label, worst.total_profit
        );
    }

    print_group("🕐 SESSION ANALYSIS", &report.session_stats, true);
    print_group("🎯 TRADE TYPE ANALYSIS", &report.trade_kind_stats, false);
    print_group("🚪 EXIT REASON ANALYSIS", &report.exit_reason_stats, false);

    println!("\n📆 MONTHLY PERFORMANCE");
    println!("{}", "─".repeat(80));
    for row in &report.monthly_stats {
        let icon = if row.total_profit > 0.0 { "📈" } else { "📉" };
        println!(
            "{} {}:  ${:+.2}  ({} trades)",
            icon, row.label, row.total_profit, row.trade_count
        );
    }

    println!("\n{}\n", "═".repeat(80));
}

fn print_group(title: &str, rows: &[GroupRow], with_win_rate: bool) {
    println!("\n{}", title);
    println!("{}", "─".repeat(80));
    if with_win_rate {
        println!(
            "{:<12} {:>14} {:>14} {:>8} {:>10}",
            "Group", "Total Profit", "Avg Profit", "Trades", "Win Rate"
        );
        println!("{}", "─".repeat(80));
        for row in rows {
            println!(
                "{:<12} {:>+14.2} {:>+14.2} {:>8} {:>9.1}%",
                row.label, row.total_profit, row.avg_profit, row.trade_count, row.win_rate
            );
        }
    } else {
        for row in rows {
            println!(
                "{:<12} Total: ${:<+10.2}  Avg: ${:<+10.2}  Count: {}",
                row.label, row.total_profit, row.avg_profit, row.trade_count
            );
        }
    }
}

// ── Exports ───────────────────────────────────────────────────────────────────

fn save_trades(trades: &[Trade], path: &Path) -> std::io::Result<()> {
    let mut f = File::create(path)?;
    writeln!(
        f,
        "direction,kind,session,entry_time,exit_time,entry_price,exit_price,lot_size,tp_price,pips,profit,exit_reason"
    )?;
    for t in trades {
        writeln!(
            f,
            "{},{},{},{},{},{:.5},{},{:.2},{:.5},{},{},{}",
            t.direction,
            t.kind,
            t.slot,
            t.entry_time.format("%Y-%m-%d %H:%M"),
            t.exit_time
                .map(|x| x.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            t.entry_price,
            t.exit_price.map(|p| format!("{:.5}", p)).unwrap_or_default(),
            t.lot_size,
            t.tp_price,
            t.pips.map(|p| format!("{:.1}", p)).unwrap_or_default(),
            t.profit.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            t.exit_reason.map(|r| r.to_string()).unwrap_or_default(),
        )?;
    }
    Ok(())
}

fn save_summary_json(report: &Report, path: &Path) -> std::io::Result<()> {
    let summary = serde_json::json!({
        "summary": report.summary,
        "weekday_stats": report.weekday_stats,
        "monthly_stats": report.monthly_stats,
        "session_stats": report.session_stats,
        "trade_kind_stats": report.trade_kind_stats,
        "exit_reason_stats": report.exit_reason_stats,
    });
    let mut f = File::create(path)?;
    f.write_all(serde_json::to_string_pretty(&summary)?.as_bytes())?;
    Ok(())
}

fn save_equity(report: &Report, path: &Path) -> std::io::Result<()> {
    let mut f = File::create(path)?;
    writeln!(
        f,
        "date,weekday,balance,daily_profit,trades_closed,cumulative_max,drawdown,drawdown_pct"
    )?;
    for p in &report.equity_curve {
        writeln!(
            f,
            "{},{},{:.2},{:.2},{},{:.2},{:.2},{:.4}",
            p.date,
            p.weekday,
            p.balance,
            p.daily_profit,
            p.trades_closed,
            p.cumulative_max,
            p.drawdown,
            p.drawdown_pct
        )?;
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let data_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("data/{}_M5.csv", SYMBOL)));
    let out_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("backtest_trades.csv"));

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║       RANGE BREAKOUT BACKTESTER  —  {}  M5        ║", SYMBOL);
    println!(
        "║  Capital: ${:<8.0}  Base lot: {:<6.2}                 ║",
        INITIAL_BALANCE, LOT_SIZE
    );
    println!("╚═══════════════════════════════════════════════════════╝");

    print!("  {:?} … loading", data_path);
    let candles = load_csv(&data_path);
    println!(" {} candles  →  running …", candles.len());

    let mut backtester = Backtester::new(INITIAL_BALANCE, LOT_SIZE);
    match backtester.run(&candles) {
        Some(report) => {
            print_report(&report);

            let json_path = out_path.with_extension("json");
            let equity_path = out_path.with_file_name(format!(
                "{}_equity.csv",
                out_path.file_stem().and_then(|s| s.to_str()).unwrap_or("backtest")
            ));

            if let Err(e) = save_trades(backtester.trades(), &out_path) {
                eprintln!("  ⚠  trade log not saved: {}", e);
            }
            if let Err(e) = save_summary_json(&report, &json_path) {
                eprintln!("  ⚠  summary not saved: {}", e);
            }
            if let Err(e) = save_equity(&report, &equity_path) {
                eprintln!("  ⚠  equity curve not saved: {}", e);
            }
            println!("  📄 Results saved: {:?}, {:?}, {:?}\n", out_path, json_path, equity_path);
        }
        None => {
            println!("\n  ❌ No trades executed — nothing to report.\n");
        }
    }
}
