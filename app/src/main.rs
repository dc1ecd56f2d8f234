// In app/src/main.rs

use anyhow::{Context, Result};
use api_client::{ApiClient, ExchangeClient, GuardedClient, RetryPolicy};
use app_config::Settings;
use clap::{Parser, Subcommand};
use engine::{CycleReport, Engine, ExchangeKlines};
use std::path::PathBuf;
use std::sync::Arc;
use strategies::{KlineSignalProvider, SignalProvider};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A leveraged perpetual-futures position lifecycle engine.")]
struct Cli {
    /// Load settings from this file instead of the layered `config/` directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs cycles on the configured interval until Ctrl-C, then closes everything.
    Run,

    /// Runs exactly one cycle and prints its report.
    Cycle,

    /// Closes every position on the configured symbols and cancels their orders.
    Flatten,

    /// Prints the contract specifications of the configured symbols.
    Contracts,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => app_config::load_settings_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => app_config::load_settings().context("failed to load settings")?,
    };
    init_tracing(&settings.app.log_level);

    tracing::info!(environment = %settings.app.environment, "Starting engine application.");

    match cli.command {
        Commands::Run => run(&settings).await?,
        Commands::Cycle => {
            let mut engine = build_engine(&settings).await?;
            let report = engine.run_cycle().await?;
            print_report(&report);
        }
        Commands::Flatten => {
            let mut engine = build_engine(&settings).await?;
            engine.shutdown().await?;
        }
        Commands::Contracts => {
            let client = build_client(&settings)?;
            let registry = engine::ContractRegistry::load(client.as_ref(), &settings.engine.symbols()).await?;
            println!("{:<14} {:>12} {:>12} {:>6} {:>6} {:>12}", "symbol", "min_qty", "step", "px_dp", "qty_dp", "min_notional");
            for spec in registry.specs() {
                println!(
                    "{:<14} {:>12} {:>12} {:>6} {:>6} {:>12}",
                    spec.symbol.to_string(),
                    spec.min_qty, spec.step_size, spec.price_precision, spec.qty_precision, spec.min_notional
                );
            }
        }
    }

    tracing::info!("Engine application has finished.");
    Ok(())
}

/// Installs the fmt layer. `level` falls back to INFO when it does not parse.
fn init_tracing(level: &str) {
    let default = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let filter = Targets::new()
        .with_target("hyper", tracing::Level::WARN)
        .with_target("reqwest", tracing::Level::WARN)
        .with_default(default);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();
}

/// The signed REST client behind the concurrency cap and retry policy.
fn build_client(settings: &Settings) -> Result<Arc<dyn ExchangeClient>> {
    let api = ApiClient::new(&settings.exchange).context("failed to build the exchange client")?;
    let guarded = GuardedClient::new(
        api,
        settings.engine.max_in_flight_requests,
        RetryPolicy::from_settings(&settings.retry),
    );
    Ok(Arc::new(guarded))
}

async fn build_engine(settings: &Settings) -> Result<Engine> {
    let client = build_client(settings)?;
    let signals: Arc<dyn SignalProvider> = Arc::new(KlineSignalProvider::new(
        ExchangeKlines::new(client.clone()),
        settings.signal.clone(),
    ));
    let engine = Engine::bootstrap(settings, client, signals)
        .await
        .context("engine bootstrap failed")?;
    Ok(engine)
}

async fn run(settings: &Settings) -> Result<()> {
    let mut engine = build_engine(settings).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C; shutting down.");
        }
    };
    engine.run(shutdown).await
}

fn print_report(report: &CycleReport) {
    println!(
        "equity {} (peak {}, drawdown {}), halted: {}, liquidated: {}",
        report.equity, report.peak_equity, report.drawdown_pct, report.entries_halted, report.liquidated
    );
    println!(
        "managed {}, closed {:?}, realized {}, open positions {}",
        report.managed, report.closed, report.realized_pnl, report.open_positions
    );
    for (symbol, side) in &report.opened {
        println!("opened {symbol} {side}");
    }
    for (symbol, reason) in &report.skipped {
        println!("skipped {symbol}: {reason}");
    }
}
