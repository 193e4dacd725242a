//! ExitLab CLI: evaluate exit rules for one position or replay a bar file.
//!
//! Commands:
//! - `check`: run the orchestrator once for a position described on the command line
//! - `replay`: open a position on the first bar of a CSV file and walk it forward
//!   until the exit engine says close everything

mod bars;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exitlab_core::domain::ConfigHash;
use exitlab_core::{
    pnl_pct, EvaluationResult, ExitConfig, ExitContext, ExitOrchestrator, MarketSnapshot,
    NewPosition, PositionLedger, PositionProfit, PositionSide, RecommendedAction, TradeSignal,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exitlab", about = "ExitLab CLI: exit-strategy evaluation engine")]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of a text summary.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single position at one price.
    Check(CheckArgs),
    /// Replay a CSV bar file through the ledger and orchestrator.
    Replay(ReplayArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Entry price.
    #[arg(long)]
    entry: f64,

    /// Current market price.
    #[arg(long)]
    price: f64,

    /// Position side: long or short.
    #[arg(long)]
    side: PositionSide,

    /// Bars the position has been open.
    #[arg(long, default_value_t = 0)]
    bars_held: usize,

    /// Account equity when trading started.
    #[arg(long, requires = "current_equity")]
    initial_equity: Option<f64>,

    /// Account equity now.
    #[arg(long, requires = "initial_equity")]
    current_equity: Option<f64>,

    /// Signal the position was opened on (BUY, SELL, HOLD).
    #[arg(long, requires = "current_signal")]
    entry_signal: Option<TradeSignal>,

    /// Latest signal (BUY, SELL, HOLD).
    #[arg(long, requires = "entry_signal")]
    current_signal: Option<TradeSignal>,

    /// Highest (long) or lowest (short) price seen since entry.
    #[arg(long)]
    peak: Option<f64>,
}

#[derive(Args)]
struct ReplayArgs {
    /// CSV file with columns timestamp,open,high,low,close.
    #[arg(long)]
    bars: PathBuf,

    /// Position side: long or short.
    #[arg(long)]
    side: PositionSide,

    /// Entry price. Defaults to the first bar's close.
    #[arg(long)]
    entry: Option<f64>,

    /// Starting account equity. Current equity is marked to market assuming
    /// the whole account rides on the position.
    #[arg(long)]
    initial_equity: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ExitConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ExitConfig::default(),
    };
    init_logging(&config.logging.level);

    let fingerprint = config.fingerprint()?;
    tracing::info!(config = %fingerprint.short(), "configuration loaded");
    let orchestrator = ExitOrchestrator::from_config(config.risk_management.clone())?;

    match cli.command {
        Commands::Check(args) => run_check(&orchestrator, &fingerprint, args, cli.json),
        Commands::Replay(args) => run_replay(&orchestrator, &fingerprint, args, cli.json),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

// ─── check ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CheckReport<'a> {
    config_hash: &'a ConfigHash,
    side: PositionSide,
    entry_price: f64,
    current_price: f64,
    pnl_pct: f64,
    result: &'a EvaluationResult,
}

fn run_check(
    orchestrator: &ExitOrchestrator,
    fingerprint: &ConfigHash,
    args: CheckArgs,
    json: bool,
) -> Result<()> {
    let mut ctx = ExitContext::new().with_bars_held(args.bars_held);
    if let Some(peak) = args.peak {
        ctx = ctx.with_peak(peak);
    }
    if let (Some(initial), Some(current)) = (args.initial_equity, args.current_equity) {
        ctx = ctx.with_equity(initial, current);
    }
    if let (Some(entry), Some(current)) = (args.entry_signal, args.current_signal) {
        ctx = ctx.with_signals(entry, current);
    }

    let result = orchestrator.evaluate(args.entry, args.price, args.side, &ctx);
    let report = CheckReport {
        config_hash: fingerprint,
        side: args.side,
        entry_price: args.entry,
        current_price: args.price,
        pnl_pct: pnl_pct(args.entry, args.price, args.side),
        result: &result,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_check(&report);
    }
    Ok(())
}

fn print_check(report: &CheckReport<'_>) {
    let result = report.result;
    println!();
    println!("=== Exit Check ===");
    println!("Config:         {}", report.config_hash.short());
    println!(
        "Position:       {} @ {} -> {}",
        report.side, report.entry_price, report.current_price
    );
    println!("PnL:            {:.3}%", report.pnl_pct);
    println!();
    print_decision(result);
    println!();
}

fn print_decision(result: &EvaluationResult) {
    println!("Action:         {}", result.recommended_action);
    match result.primary_exit {
        Some(primary) => println!("Primary exit:   {primary}"),
        None => println!("Primary exit:   -"),
    }
    if result.recommended_action == RecommendedAction::ClosePartial {
        println!("Close:          {:.1}%", result.close_percent());
    }
    if let Some(levels) = &result.atr_levels {
        println!(
            "ATR:            {:.6} (stop {:.6}, target {:.6})",
            levels.atr, levels.stop, levels.target
        );
    }
    println!();
    println!("--- Rules ---");
    for signal in &result.exits {
        let mark = if signal.is_triggered() { "EXIT" } else { "hold" };
        println!("{:<16} {:<5} {}", signal.exit_type().as_str(), mark, signal.reason());
    }
}

// ─── replay ──────────────────────────────────────────────────────────

const REPLAY_ID: &str = "replay";

#[derive(Serialize)]
struct ReplayEvent {
    bar: usize,
    timestamp: String,
    price: f64,
    action: RecommendedAction,
    result: EvaluationResult,
}

#[derive(Serialize)]
struct ReplayReport {
    config_hash: ConfigHash,
    side: PositionSide,
    entry_price: f64,
    bars_replayed: usize,
    closed_at_bar: Option<usize>,
    events: Vec<ReplayEvent>,
    profit: PositionProfit,
}

fn run_replay(
    orchestrator: &ExitOrchestrator,
    fingerprint: &ConfigHash,
    args: ReplayArgs,
    json: bool,
) -> Result<()> {
    let bars = bars::load_bars(&args.bars)?;
    let report = replay(orchestrator, fingerprint, &bars, &args)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_replay(&report, &args.bars);
    }
    Ok(())
}

fn replay(
    orchestrator: &ExitOrchestrator,
    fingerprint: &ConfigHash,
    bars: &[exitlab_core::Bar],
    args: &ReplayArgs,
) -> Result<ReplayReport> {
    let first = bars.first().context("bar file contains no bars")?;
    let entry_price = args.entry.unwrap_or(first.close);

    let mut ledger = PositionLedger::new();
    ledger.start_tracking(
        NewPosition::new(REPLAY_ID, entry_price, args.side).with_entry_signal(args.side.entry_signal()),
    )?;

    let mut events = Vec::new();
    let mut closed_at_bar = None;
    let mut last_price = entry_price;
    let mut bars_replayed = 0;

    for (i, bar) in bars.iter().enumerate().skip(1) {
        ledger.update_bar(REPLAY_ID, bar, i)?;
        last_price = bar.close;
        bars_replayed += 1;

        let mut snapshot = MarketSnapshot::at_price(bar.close).with_history(&bars[..=i]);
        if let Some(initial) = args.initial_equity {
            let current = initial * (1.0 + pnl_pct(entry_price, bar.close, args.side) / 100.0);
            snapshot = snapshot.with_equity(initial, current);
        }
        let result = ledger.evaluate_exit(REPLAY_ID, orchestrator, &snapshot)?;
        let action = result.recommended_action;
        if result.should_exit {
            tracing::info!(
                bar = i,
                price = bar.close,
                action = %action,
                primary = ?result.primary_exit,
                "exit triggered"
            );
            events.push(ReplayEvent {
                bar: i,
                timestamp: bar.timestamp.to_string(),
                price: bar.close,
                action,
                result,
            });
        }
        if action == RecommendedAction::CloseAll {
            closed_at_bar = Some(i);
            break;
        }
    }

    let profit = ledger.position_profit(REPLAY_ID, last_price)?;
    ledger.stop_tracking(REPLAY_ID)?;

    Ok(ReplayReport {
        config_hash: fingerprint.clone(),
        side: args.side,
        entry_price,
        bars_replayed,
        closed_at_bar,
        events,
        profit,
    })
}

fn print_replay(report: &ReplayReport, path: &Path) {
    println!();
    println!("=== Replay ===");
    println!("File:           {}", path.display());
    println!("Config:         {}", report.config_hash.short());
    println!("Position:       {} @ {}", report.side, report.entry_price);
    println!("Bars replayed:  {}", report.bars_replayed);
    match report.closed_at_bar {
        Some(bar) => println!("Closed at bar:  {bar}"),
        None => println!("Closed at bar:  - (still open)"),
    }
    println!();
    println!("--- Exit events ---");
    if report.events.is_empty() {
        println!("(none)");
    }
    for event in &report.events {
        println!(
            "bar {:>5}  {}  {:<12} {:<14} {}",
            event.bar,
            event.timestamp,
            event.price,
            event.action,
            event
                .result
                .primary_exit
                .map(|e| e.as_str())
                .unwrap_or("-")
        );
    }
    let p = &report.profit;
    println!();
    println!("--- Position ---");
    println!("PnL:            {:.6} ({:.3}%)", p.pnl, p.pnl_pct);
    println!("Bars held:      {}", p.bars_held);
    println!("Max favorable:  {:.6}", p.max_favorable);
    println!("Max adverse:    {:.6}", p.max_adverse);
    println!();
}
