//! Read-side financial reports over the stakewatch ledger.
//!
//! All calculators read a fresh snapshot of the store and keep no state.
//! Amounts are integer micro-units throughout; each report's `display()`
//! converts to decimal units for output.
//!
//! - [`BalanceCalculator`]: initial balance minus fees plus proposer payouts
//! - [`RewardsCalculator`]: totals, extremes and per-day breakdown of rewards
//! - [`AprEstimator`]: annualized yield since the bootstrap
//! - [`Reporter`]: all of the above plus ledger listing for one entity
//!
//! The only write a report can cause is persisting a bootstrap found by late
//! detection during [`BalanceCalculator::compute`].

pub mod apr;
pub mod balance;
pub mod rewards;
pub mod summary;

#[cfg(test)]
mod testutil;

pub use stakewatch_ingest::{Error, Result};

pub use apr::{AprDisplay, AprEstimator, AprReport};
pub use balance::{BalanceCalculator, BalanceDisplay, BalanceReport};
pub use rewards::{DailyReward, DailyRewardDisplay, RewardsCalculator, RewardsDisplay, RewardsReport};
pub use summary::{EntitySummary, EntitySummaryDisplay, Reporter, TransactionListing};
