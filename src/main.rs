use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use statarb::config::EngineConfig;
use statarb::engine::MonitorEngine;
use statarb::ports::file_source::FileSource;
use statarb::ports::notifier::LogNotifier;
use statarb::ports::price_source::{PriceSource, RetryingSource};
use statarb::ports::replay_source::ReplaySource;
use statarb::ports::store::JsonFileStore;

#[derive(Parser)]
#[command(name = "statarb", about = "Pair fitness and mean-reversion signal engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory of per-symbol close files serving as the price source
    #[arg(long, global = true, default_value = "price_data")]
    data_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the watchlist from the full universe
    Scan,
    /// Run the periodic monitoring loop
    Monitor {
        /// Replay a recorded JSONL price dump instead of polling live
        #[arg(long)]
        replay: Option<String>,
    },
    /// Evaluate a single pair (e.g. BTC/ETH) and print the verdict
    Analyze { pair: String },
    /// Open a position in a pair (manual override)
    Enter { pair: String },
    /// Close a live position
    Exit { pair: String },
    /// Print closed-trade history
    History,
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_logging() {
    // Local-timezone timestamps via TIMEZONE_OFFSET (seconds east of UTC).
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);
    let offset = FixedOffset::east_opt(offset_seconds).unwrap_or_else(|| {
        FixedOffset::east_opt(0).expect("zero offset is always valid")
    });
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
                .unwrap_or(LevelFilter::Info),
        )
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = EngineConfig::from_env_or_yaml()?;
    let store = Arc::new(JsonFileStore::new(cfg.state_dir.clone()));
    let notifier = Arc::new(LogNotifier);

    match cli.command {
        Commands::Monitor {
            replay: Some(path),
        } => {
            let replay = Arc::new(ReplaySource::new(&path)?);
            let mut engine = MonitorEngine::new(cfg, replay.clone(), store, notifier);
            engine.run_replay(replay).await
        }
        Commands::Monitor { replay: None } => {
            let source = live_source(&cli.data_dir, &cfg);
            let mut engine = MonitorEngine::new(cfg, source, store, notifier);
            engine.run().await
        }
        Commands::Scan => {
            let source = live_source(&cli.data_dir, &cfg);
            let engine = MonitorEngine::new(cfg, source, store, notifier);
            let watchlist = engine.run_scan(Utc::now().timestamp()).await?;
            println!("watchlist: {} entries", watchlist.entries.len());
            for entry in &watchlist.entries {
                println!(
                    "  {:<12} sector={:<14} score={:>8.3} corr={:.3} hl={} z={:+.2} entry={:.1}",
                    entry.pair,
                    entry.sector,
                    entry.quality_score,
                    entry.verdict.correlation,
                    entry
                        .verdict
                        .half_life
                        .days()
                        .map(|d| format!("{:.1}d", d))
                        .unwrap_or_else(|| "inf".to_string()),
                    entry.verdict.current_z_score,
                    entry.entry_threshold
                );
            }
            Ok(())
        }
        Commands::Analyze { pair } => {
            let source = live_source(&cli.data_dir, &cfg);
            let engine = MonitorEngine::new(cfg, source, store, notifier);
            let (sym1, sym2) = pair
                .split_once('/')
                .ok_or_else(|| anyhow::anyhow!("pair must look like BTC/ETH"))?;
            let (verdict, profile) = engine.analyze(sym1, sym2).await?;
            println!("{}/{}", sym1, sym2);
            println!("  correlation:      {:.4}", verdict.correlation);
            println!("  beta:             {:.4}", verdict.beta);
            println!("  spread mean/std:  {:.6} / {:.6}", verdict.mean_spread, verdict.std_dev_spread);
            println!("  current z:        {:+.3}", verdict.current_z_score);
            println!(
                "  half-life:        {}",
                verdict
                    .half_life
                    .days()
                    .map(|d| format!("{:.1} days", d))
                    .unwrap_or_else(|| "infinite".to_string())
            );
            println!("  cointegrated:     {}", verdict.is_cointegrated);
            println!("  reversion rate:   {:.2}", verdict.mean_reversion_rate);
            println!("  entry threshold:  {:.2}", profile.optimal_entry_threshold);
            for t in &profile.thresholds {
                println!(
                    "    z>={:.1}: events={} reverted={} rate={:.2}",
                    t.threshold, t.events, t.reverted, t.reversion_rate
                );
            }
            Ok(())
        }
        Commands::Enter { pair } => {
            let source = live_source(&cli.data_dir, &cfg);
            let mut engine = MonitorEngine::new(cfg, source, store, notifier);
            engine.force_enter(&pair, Utc::now().timestamp()).await?;
            println!("entered {}", pair);
            Ok(())
        }
        Commands::Exit { pair } => {
            let source = live_source(&cli.data_dir, &cfg);
            let mut engine = MonitorEngine::new(cfg, source, store, notifier);
            let record = engine.force_exit(&pair, Utc::now().timestamp()).await?;
            println!("closed {}: pnl {}%", pair, record.realized_pnl_pct);
            Ok(())
        }
        Commands::History => {
            let source = live_source(&cli.data_dir, &cfg);
            let engine = MonitorEngine::new(cfg, source, store, notifier);
            let history = engine.history().await?;
            if history.records.is_empty() {
                println!("no closed trades");
                return Ok(());
            }
            for record in &history.records {
                println!(
                    "{} {:?} entered z={:+.2} exited z={:+.2} ({}) pnl={}%",
                    record.trade.pair,
                    record.trade.direction,
                    record.trade.entry_z_score,
                    record.exit_z_score,
                    record.exit_reason,
                    record.realized_pnl_pct
                );
            }
            Ok(())
        }
    }
}

fn live_source(data_dir: &str, cfg: &EngineConfig) -> Arc<dyn PriceSource> {
    Arc::new(RetryingSource::new(
        FileSource::new(data_dir),
        cfg.fetch_max_attempts,
        cfg.fetch_base_delay_ms,
    ))
}
