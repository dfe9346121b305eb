//! Stakewatch sync daemon.
//!
//! Periodically pulls new transactions for every registered entity from the
//! indexer into the local ledger store.
//!
//! # Usage
//!
//! ```bash
//! # Run with settings from the environment (and ./.env if present)
//! stakewatch-ingest
//!
//! # Run a single cycle and print its report
//! stakewatch-ingest --once
//!
//! # Custom database, metrics disabled
//! stakewatch-ingest --db /var/lib/stakewatch/ledger.db --metrics-port 0
//! ```
//!
//! # Graceful Shutdown
//!
//! On SIGINT (Ctrl+C) the daemon finishes the entity it is syncing, skips the
//! remaining entities and the wait before the next cycle, and exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stakewatch_core::metrics::{init_metrics, start_metrics_server};
use stakewatch_ingest::{Config, HttpIndexer, SqliteStore, SyncConfig, SyncOrchestrator};
use tracing_subscriber::EnvFilter;

/// Stakewatch sync daemon.
#[derive(Parser, Debug)]
#[command(name = "stakewatch-ingest")]
#[command(about = "Incremental ledger sync for tracked entities")]
#[command(version)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// SQLite database path (overrides STAKEWATCH_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Run one sync cycle and exit
    #[arg(long)]
    once: bool,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env file if it exists
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)
            .with_context(|| format!("Failed to load {}", args.dotenv))?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("stakewatch_ingest=debug".parse()?),
        )
        .init();

    tracing::info!("Stakewatch sync daemon starting...");

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }

    // Initialize metrics
    if args.metrics_port > 0 && !args.once {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
    }

    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("Failed to open {}", config.db_path.display()))?,
    );
    let indexer = Arc::new(
        HttpIndexer::new(
            &config.indexer_url,
            config.indexer_token.clone(),
            config.fetch_timeout,
        )
        .context("Failed to create indexer client")?,
    );
    let orchestrator = Arc::new(SyncOrchestrator::new(
        store,
        indexer,
        SyncConfig::from(&config),
    ));

    // Set up graceful shutdown. A signal that arrives before the loop starts
    // is kept until run_periodic checks it.
    let handler_orchestrator = Arc::clone(&orchestrator);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        handler_orchestrator.stop();
    })
    .context("Failed to set Ctrl+C handler")?;

    if args.once {
        let report = orchestrator.sync_all().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    orchestrator.run_periodic().await?;

    tracing::info!("Stakewatch sync daemon stopped");
    Ok(())
}
