//! ENDGAME: paper-trading scanner for prediction markets about to close.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches to one of the subcommands: a single run, a repeating watch
//! loop with graceful shutdown, a settlement report, or the dashboard.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use endgame::config::AppConfig;
use endgame::dashboard;
use endgame::engine::settlement::{self, SettlementStatus};
use endgame::engine::Pipeline;
use endgame::platforms::polymarket::GammaClient;
use endgame::platforms::MarketSource;
use endgame::storage::{self, RunLedger};

const BANNER: &str = r#"
  _____ _   _ ____   ____    _    __  __ _____
 | ____| \ | |  _ \ / ___|  / \  |  \/  | ____|
 |  _| |  \| | | | | |  _  / _ \ | |\/| |  _|
 | |___| |\  | |_| | |_| |/ ___ \| |  | | |___
 |_____|_| \_|____/ \____/_/   \_\_|  |_|_____|

  Last-hour prediction market scanner (paper trading)
"#;

#[derive(Parser)]
#[command(name = "endgame")]
#[command(about = "Paper-trade near-certain prediction markets in their final hour")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan once, plan, paper-execute and record the run
    Run {
        /// Starting virtual balance (defaults to allocation.virtual_budget)
        #[arg(long)]
        balance: Option<Decimal>,
        /// Build the run record without appending it to the ledger
        #[arg(long)]
        dry: bool,
    },
    /// Repeat runs every scan.interval_secs until Ctrl+C
    Watch {
        #[arg(long)]
        balance: Option<Decimal>,
    },
    /// Show the latest run and settle every recorded trade
    Report,
    /// Serve the ledger over HTTP
    Dashboard {
        /// Overrides dashboard.port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load_or_default(&cli.config)?;
    cfg.validate()?;

    match cli.command {
        Commands::Run { balance, dry } => {
            let pipeline = build_pipeline(&cfg, balance).await?.dry_run(dry);
            let run_id = storage::new_run_id();
            let record = pipeline.run_once(&run_id, Utc::now()).await?;
            println!("{record}");
            for trade in &record.executed_trades {
                println!("  {} {} ${:.2} @ {} ({})", trade.market_id, trade.outcome, trade.amount, trade.price, trade.status);
            }
        }
        Commands::Watch { balance } => {
            println!("{BANNER}");
            let pipeline = build_pipeline(&cfg, balance).await?;
            watch(&pipeline, cfg.scan.interval_secs).await;
        }
        Commands::Report => {
            let ledger = storage::open_ledger(&cfg.ledger).await?;
            let source = GammaClient::new(&cfg.scan)?;
            report(&*ledger, &source).await?;
        }
        Commands::Dashboard { port } => {
            let ledger = storage::open_ledger(&cfg.ledger).await?;
            dashboard::serve(ledger, port.unwrap_or(cfg.dashboard.port)).await?;
        }
    }

    Ok(())
}

async fn build_pipeline(cfg: &AppConfig, balance: Option<Decimal>) -> Result<Pipeline> {
    let source: Arc<dyn MarketSource> = Arc::new(GammaClient::new(&cfg.scan)?);
    let ledger = storage::open_ledger(&cfg.ledger).await?;

    let mut pipeline = Pipeline::new(cfg.clone(), source, ledger);
    if let Some(balance) = balance {
        pipeline = pipeline.with_balance(balance);
    }

    info!(
        max_hours = pipeline.config().filter.max_hours_to_end,
        min_probability = %pipeline.config().filter.min_probability,
        budget = format!("${:.2}", pipeline.config().allocation.virtual_budget),
        max_selections = pipeline.config().allocation.max_selections,
        "Pipeline ready"
    );
    Ok(pipeline)
}

/// Run on a fixed interval until Ctrl+C. A failed run is logged and the
/// loop carries on with the next tick.
async fn watch(pipeline: &Pipeline, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs, "Entering watch loop. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let run_id = storage::new_run_id();
                match pipeline.run_once(&run_id, Utc::now()).await {
                    Ok(record) => info!(%record, "Run recorded"),
                    Err(e) => error!(run_id = %run_id, error = %e, "Run failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }
}

async fn report(ledger: &dyn RunLedger, source: &dyn MarketSource) -> Result<()> {
    let runs = ledger.runs().await?;
    let Some(latest) = runs.last() else {
        println!("No runs recorded yet.");
        return Ok(());
    };

    println!("Latest run {} at {}", latest.run_id, latest.timestamp.format("%Y-%m-%d %H:%M UTC"));
    println!(
        "  fetched {} | scanned {} | skipped {} | matching {}",
        latest.scan_info.markets_fetched,
        latest.scan_info.markets_scanned,
        latest.scan_info.markets_skipped,
        latest.scan_info.markets_matching
    );
    println!(
        "  balance ${:.2} | invested ${:.2} | potential payout ${:.2}",
        latest.summary.balance_after, latest.summary.total_invested, latest.summary.potential_payout
    );

    let settled = settlement::settle(source, &runs).await;
    println!();
    println!(
        "Settlement: {} won, {} lost, {} cancelled, {} pending | realized P&L ${:.2} | open ${:.2}",
        settled.won, settled.lost, settled.cancelled, settled.pending, settled.realized_pnl, settled.open_exposure
    );
    for t in settled.trades.iter().filter(|t| t.status != SettlementStatus::Pending) {
        println!("  [{}] {} {} ${:.2} -> {:+.2}", t.status, t.outcome, t.question, t.amount, t.pnl);
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("endgame=info"));

    let json_logging = std::env::var("ENDGAME_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
