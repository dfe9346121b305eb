//! Entity registry administration.
//!
//! Register and remove tracked entities, list them, or trigger an on-demand
//! sync of one entity.
//!
//! # Usage
//!
//! ```bash
//! stakewatch-entities add --address <ADDRESS> --name relay-1 --initial-balance 302935.133775 --sync
//! stakewatch-entities list
//! stakewatch-entities sync <ADDRESS>
//! stakewatch-entities remove <ADDRESS>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use stakewatch_core::{NewEntity, micro_to_units, parse_units};
use stakewatch_ingest::{
    Config, EntityRegistry, HttpIndexer, LedgerStore, SqliteStore, SyncConfig, SyncOrchestrator,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stakewatch-entities")]
#[command(about = "Manage tracked entities")]
#[command(version)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// SQLite database path (overrides STAKEWATCH_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new entity
    Add {
        /// Account address (58 base32 characters)
        #[arg(long)]
        address: String,

        /// Display name (defaults to Node-<first 8 characters>)
        #[arg(long)]
        name: Option<String>,

        /// Balance at registration, in display units (e.g. 302935.133775)
        #[arg(long, default_value = "0")]
        initial_balance: String,

        /// Run the first sync right after registering
        #[arg(long)]
        sync: bool,
    },

    /// Remove an entity from the registry (its ledger rows are kept)
    Remove { address: String },

    /// List registered entities
    List,

    /// Synchronize one entity now
    Sync { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)
            .with_context(|| format!("Failed to load {}", args.dotenv))?;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("Failed to open {}", config.db_path.display()))?,
    );

    match args.command {
        Command::Add {
            address,
            name,
            initial_balance,
            sync,
        } => {
            let initial_balance =
                parse_units(&initial_balance).context("Invalid --initial-balance")?;
            let entity = store.register(NewEntity {
                address,
                display_name: name,
                initial_balance,
            })?;
            println!("{}", serde_json::to_string_pretty(&entity)?);

            if sync {
                let outcome = orchestrator(store, &config)?.synchronize(&entity).await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
        }
        Command::Remove { address } => {
            if !store.remove(&address)? {
                bail!("Entity not found: {}", address);
            }
            println!("Removed {}", address);
        }
        Command::List => {
            let entities = store.list()?;
            if entities.is_empty() {
                println!("No entities registered");
            }
            for entity in entities {
                let watermark = store.latest_confirmed_round(&entity.address)?;
                println!(
                    "{}  {:<20}  initial {:>20}  round {:>10}  bootstrap {}",
                    entity.address,
                    entity.display_name,
                    micro_to_units(i128::from(entity.initial_balance)),
                    watermark,
                    entity.bootstrap_transaction_id.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Sync { address } => {
            let outcome = orchestrator(store, &config)?
                .synchronize_address(&address)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

/// On-demand orchestrator. The sync lease in the store keeps it from
/// overlapping a running daemon on the same entity.
fn orchestrator(
    store: Arc<SqliteStore>,
    config: &Config,
) -> Result<SyncOrchestrator<SqliteStore, HttpIndexer>> {
    let indexer = Arc::new(
        HttpIndexer::new(
            &config.indexer_url,
            config.indexer_token.clone(),
            config.fetch_timeout,
        )
        .context("Failed to create indexer client")?,
    );
    Ok(SyncOrchestrator::new(store, indexer, SyncConfig::from(config)))
}
