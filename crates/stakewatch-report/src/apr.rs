//! Annualized reward yield.
//!
//! The balance starts at the entity's initial balance at bootstrap time and
//! grows by each reward. The average of those balance snapshots is the
//! capital base; fees are not deducted.
//!
//! ```text
//! apr = (total_rewards / avg_balance) / (elapsed_days / 365) * 100
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use stakewatch_core::{
    DAYS_PER_YEAR, Entity, REWARD_SOURCE_ADDRESS, SECONDS_PER_DAY, micro_decimal, micro_to_units,
};
use stakewatch_ingest::{LedgerStore, Page, TxOrder};

use crate::Result;
use crate::rewards::reward_filter;

/// Estimated yield of one entity. Amounts in micro-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AprReport {
    pub address: String,
    pub display_name: String,
    pub initial_balance: u64,
    /// Rewards received since the bootstrap.
    pub total_rewards: u128,
    pub reward_count: usize,
    /// Mean balance over the snapshots, in micro-units.
    pub avg_balance: Decimal,
    /// From the bootstrap to the last reward.
    pub time_elapsed_days: Decimal,
    /// Percent per year.
    pub estimated_apr: Decimal,
}

/// [`AprReport`] in display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AprDisplay {
    pub address: String,
    pub display_name: String,
    pub initial_balance: Decimal,
    pub total_rewards: Decimal,
    pub reward_count: usize,
    pub avg_balance: Decimal,
    pub time_elapsed_days: Decimal,
    pub estimated_apr: Decimal,
}

impl AprReport {
    fn zero(entity: &Entity) -> Self {
        Self {
            address: entity.address.clone(),
            display_name: entity.display_name.clone(),
            initial_balance: entity.initial_balance,
            total_rewards: 0,
            reward_count: 0,
            avg_balance: Decimal::ZERO,
            time_elapsed_days: Decimal::ZERO,
            estimated_apr: Decimal::ZERO,
        }
    }

    pub fn display(&self) -> AprDisplay {
        let micros = Decimal::from(stakewatch_core::MICROS_PER_UNIT);
        AprDisplay {
            address: self.address.clone(),
            display_name: self.display_name.clone(),
            initial_balance: micro_to_units(i128::from(self.initial_balance)),
            total_rewards: micro_to_units(i128::try_from(self.total_rewards).unwrap_or(i128::MAX)),
            reward_count: self.reward_count,
            avg_balance: self.avg_balance.checked_div(micros).unwrap_or(Decimal::ZERO),
            time_elapsed_days: self.time_elapsed_days,
            estimated_apr: self.estimated_apr.round_dp(6),
        }
    }
}

/// Estimates annualized yield from rewards received since the bootstrap.
pub struct AprEstimator<S> {
    store: Arc<S>,
    reward_source: String,
}

impl<S: LedgerStore> AprEstimator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            reward_source: REWARD_SOURCE_ADDRESS.to_string(),
        }
    }

    /// Count payments from `source` instead of the mainnet reward source.
    pub fn with_reward_source(mut self, source: impl Into<String>) -> Self {
        self.reward_source = source.into();
        self
    }

    /// Estimate the APR.
    ///
    /// An entity without a recorded bootstrap transaction, or without rewards
    /// since it, gets an all-zero report. So does one whose last reward landed
    /// at the bootstrap instant.
    pub fn estimate(&self, entity: &Entity) -> Result<AprReport> {
        let Some(bootstrap_id) = entity.bootstrap_transaction_id.as_deref() else {
            return Ok(AprReport::zero(entity));
        };
        let Some(bootstrap) = self.store.find(&entity.address, bootstrap_id)? else {
            tracing::warn!(
                address = %entity.address,
                transaction_id = %bootstrap_id,
                "bootstrap transaction missing from ledger, APR unavailable"
            );
            return Ok(AprReport::zero(entity));
        };
        let start_time = bootstrap.occurred_at;

        let rewards = self.store.query(
            &reward_filter(entity, &self.reward_source).occurred_since(start_time),
            TxOrder::OccurredAtAsc,
            Page::all(),
        )?;
        let Some(last) = rewards.last() else {
            return Ok(AprReport::zero(entity));
        };

        // Snapshot at bootstrap, then one after each reward
        let mut balance = i128::from(entity.initial_balance);
        let mut snapshot_sum = balance;
        let mut total_rewards: u128 = 0;
        for tx in &rewards {
            balance += i128::from(tx.amount);
            snapshot_sum += balance;
            total_rewards += u128::from(tx.amount);
        }
        let snapshots = rewards.len() + 1;

        let avg_balance = micro_decimal(snapshot_sum)
            .checked_div(Decimal::from(snapshots))
            .unwrap_or(Decimal::ZERO);

        let elapsed_secs = last.occurred_at - start_time;
        let time_elapsed_days = Decimal::from(elapsed_secs)
            .checked_div(Decimal::from(SECONDS_PER_DAY))
            .unwrap_or(Decimal::ZERO);

        let estimated_apr = annualize(
            micro_decimal(i128::try_from(total_rewards).unwrap_or(i128::MAX)),
            avg_balance,
            elapsed_secs,
        );

        Ok(AprReport {
            address: entity.address.clone(),
            display_name: entity.display_name.clone(),
            initial_balance: entity.initial_balance,
            total_rewards,
            reward_count: rewards.len(),
            avg_balance,
            time_elapsed_days,
            estimated_apr,
        })
    }
}

/// `(rewards / avg_balance) / years * 100`, or zero when either divisor is zero.
fn annualize(rewards: Decimal, avg_balance: Decimal, elapsed_secs: i64) -> Decimal {
    if elapsed_secs <= 0 || avg_balance.is_zero() {
        return Decimal::ZERO;
    }

    let seconds_per_year = Decimal::from(SECONDS_PER_DAY * DAYS_PER_YEAR);
    rewards
        .checked_div(avg_balance)
        .and_then(|ratio| ratio.checked_mul(seconds_per_year))
        .and_then(|scaled| scaled.checked_div(Decimal::from(elapsed_secs)))
        .and_then(|per_year| per_year.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}
