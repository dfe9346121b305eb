//! Stakewatch report CLI.
//!
//! Prints balance, rewards and APR reports for a tracked entity as JSON.
//!
//! # Usage
//!
//! ```bash
//! stakewatch-report balance <ADDRESS>
//! stakewatch-report daily <ADDRESS>
//! stakewatch-report details <ADDRESS> --micro
//! stakewatch-report transactions <ADDRESS> --limit 50 --skip 100
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stakewatch_ingest::{Config, SqliteStore};
use stakewatch_report::Reporter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stakewatch-report")]
#[command(about = "Financial reports over the synced ledger")]
#[command(version)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// SQLite database path (overrides STAKEWATCH_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Print raw micro-unit reports instead of display units
    #[arg(long, global = true)]
    micro: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstructed balance
    Balance { address: String },

    /// Reward totals and extremes
    Rewards { address: String },

    /// Rewards per UTC day, newest first
    Daily { address: String },

    /// Estimated annualized yield
    Apr { address: String },

    /// Balance, rewards and APR together
    Details { address: String },

    /// Stored transactions, newest round first
    Transactions {
        address: String,

        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        skip: u32,
    },
}

fn main() -> Result<()> {
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
    let reporter = Reporter::new(store).with_reward_source(config.reward_source);
    let micro = args.micro;

    match args.command {
        Command::Balance { address } => {
            let report = reporter.balance(&reporter.entity(&address)?)?;
            print_either(micro, &report, &report.display())
        }
        Command::Rewards { address } => {
            let report = reporter.rewards(&reporter.entity(&address)?)?;
            print_either(micro, &report, &report.display())
        }
        Command::Daily { address } => {
            let report = reporter.rewards(&reporter.entity(&address)?)?;
            if micro {
                let newest_first: Vec<_> = report.daily.iter().rev().collect();
                print_json(&newest_first)
            } else {
                print_json(&report.daily_display())
            }
        }
        Command::Apr { address } => {
            let report = reporter.apr(&reporter.entity(&address)?)?;
            print_either(micro, &report, &report.display())
        }
        Command::Details { address } => {
            let summary = reporter.summary(&address)?;
            print_either(micro, &summary, &summary.display())
        }
        Command::Transactions {
            address,
            limit,
            skip,
        } => {
            reporter.entity(&address)?;
            print_json(&reporter.transactions(&address, limit, skip)?)
        }
    }
}

fn print_either<R: Serialize, D: Serialize>(micro: bool, raw: &R, display: &D) -> Result<()> {
    if micro {
        print_json(raw)
    } else {
        print_json(display)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
