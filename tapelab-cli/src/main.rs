//! TapeLab CLI: replay a CSV history through the signal engine.
//!
//! Commands:
//! - `replay`: load a TOML config and a CSV history, replay it, print one
//!   JSON line per evaluation outcome
//! - `check-config`: validate a config file and exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tapelab_core::config::EngineConfig;
use tapelab_core::data::load_history;
use tapelab_core::domain::Timeframe;
use tapelab_core::engine::{EngineOutcome, MarketEvent, Orchestrator};
use tapelab_core::exec::RecordingClient;

#[derive(Parser)]
#[command(name = "tapelab", about = "Replay market data through the tapelab signal engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a CSV history and print evaluation outcomes as JSON lines.
    Replay {
        /// TOML configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// CSV history: timestamp, open, high, low, close[, volume].
        #[arg(long)]
        data: PathBuf,
        /// Symbol the history belongs to.
        #[arg(long)]
        symbol: String,
        /// Bar timeframe of the history (1min, 5min, 15min, 30min, 1h, 4h, daily).
        #[arg(long, default_value = "1h")]
        timeframe: String,
        /// Seed for deterministic signal ids.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Starting account balance for the simulated execution client.
        #[arg(long, default_value_t = 100_000.0)]
        balance: f64,
        /// Print suppressed evaluations too, not only accepted signals.
        #[arg(long)]
        verbose: bool,
    },
    /// Validate a configuration file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        Command::Replay { config, data, symbol, timeframe, seed, balance, verbose } => {
            replay(config, data, symbol, timeframe, seed, balance, verbose)
        }
        Command::CheckConfig { config } => {
            EngineConfig::from_file(&config)
                .with_context(|| format!("invalid config {}", config.display()))?;
            println!("ok");
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn replay(
    config: Option<PathBuf>,
    data: PathBuf,
    symbol: String,
    timeframe: String,
    seed: u64,
    balance: f64,
    verbose: bool,
) -> Result<()> {
    let timeframe: Timeframe = timeframe
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut engine_config = match config {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    engine_config.seed = seed;
    if !engine_config.timeframes.contains(&timeframe) {
        engine_config.timeframes.push(timeframe);
    }

    let bars = load_history(&data, timeframe, engine_config.data.gap_repair_max_perc)
        .with_context(|| format!("loading history {}", data.display()))?;

    let execution = Arc::new(RecordingClient::new(balance));
    let engine = Orchestrator::new(engine_config, execution.clone());

    let events = bars.into_iter().map(|bar| MarketEvent::Bar {
        symbol: symbol.clone(),
        timeframe,
        bar,
    });

    let mut accepted = 0usize;
    let mut suppressed = 0usize;
    for outcome in engine.replay(events) {
        match &outcome {
            EngineOutcome::Accepted { .. } => {
                accepted += 1;
                println!("{}", serde_json::to_string(&outcome)?);
            }
            EngineOutcome::Suppressed { .. } | EngineOutcome::InputRejected { .. } => {
                suppressed += 1;
                if verbose {
                    println!("{}", serde_json::to_string(&outcome)?);
                }
            }
            EngineOutcome::Absorbed => {}
        }
    }

    eprintln!(
        "replay complete: {accepted} accepted, {suppressed} suppressed, {} submitted",
        execution.submissions().len()
    );
    Ok(())
}
