//! Core types, unit conversion, and shared utilities for stakewatch.
//!
//! This crate provides:
//! - Ledger domain types ([`Entity`], [`LedgerTransaction`], [`TxKind`])
//! - Address validation for tracked accounts
//! - Exact conversion between micro-units and display units
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod metrics;
mod types;
pub mod units;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Well-known sender of block proposer rewards on mainnet.
///
/// Payments from this address to a tracked entity are counted as reward income.
pub const REWARD_SOURCE_ADDRESS: &str =
    "Y76M3MSY6DKBRHBL7C3NNDXGS5IIMQVQVUAB6MP4XEMMGVF2QWNPL226CA";

/// Fee (micro-units) paid by a key registration that opts an account into
/// reward eligibility.
pub const BOOTSTRAP_FEE_THRESHOLD: u64 = 2_000_000;

/// Marker text carried in the note of proposer payout transfers.
pub const PROPOSER_PAYOUT_MARKER: &str = "ProposerPayout";

/// Seconds in one UTC day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Days used to annualize yields.
pub const DAYS_PER_YEAR: i64 = 365;

pub use error::{Error, Result};
pub use types::{
    ADDRESS_LENGTH, Entity, LedgerTransaction, NewEntity, TxKind, default_display_name,
    validate_address,
};
pub use units::{MICROS_PER_UNIT, micro_decimal, micro_to_units, parse_units};
