//! Reward income statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use stakewatch_core::{Entity, LedgerTransaction, REWARD_SOURCE_ADDRESS, micro_to_units};
use stakewatch_ingest::{LedgerStore, Page, TxFilter, TxOrder};

use crate::Result;

/// Reward totals for one UTC day, in micro-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyReward {
    pub date: NaiveDate,
    pub total: u128,
    pub count: usize,
}

/// Rewards received by one entity, in micro-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardsReport {
    pub address: String,
    pub display_name: String,
    pub total_rewards: u128,
    pub transaction_count: usize,
    pub highest_reward: u64,
    pub lowest_reward: u64,
    /// Per-day totals, oldest first.
    pub daily: Vec<DailyReward>,
}

/// [`RewardsReport`] summary in display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardsDisplay {
    pub address: String,
    pub display_name: String,
    pub total_rewards: Decimal,
    pub transaction_count: usize,
    pub avg_rewards_per_day: Decimal,
    pub highest_reward: Decimal,
    pub lowest_reward: Decimal,
    pub days_with_rewards: usize,
}

/// One day of rewards in display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyRewardDisplay {
    pub date: NaiveDate,
    pub total: Decimal,
    pub count: usize,
}

impl RewardsReport {
    /// Average reward per day that had any reward, in display units.
    pub fn avg_rewards_per_day(&self) -> Decimal {
        if self.daily.is_empty() {
            return Decimal::ZERO;
        }
        micro_to_units(to_i128(self.total_rewards))
            .checked_div(Decimal::from(self.daily.len()))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn display(&self) -> RewardsDisplay {
        RewardsDisplay {
            address: self.address.clone(),
            display_name: self.display_name.clone(),
            total_rewards: micro_to_units(to_i128(self.total_rewards)),
            transaction_count: self.transaction_count,
            avg_rewards_per_day: self.avg_rewards_per_day(),
            highest_reward: micro_to_units(i128::from(self.highest_reward)),
            lowest_reward: micro_to_units(i128::from(self.lowest_reward)),
            days_with_rewards: self.daily.len(),
        }
    }

    /// Daily totals in display units, newest first.
    pub fn daily_display(&self) -> Vec<DailyRewardDisplay> {
        self.daily
            .iter()
            .rev()
            .map(|day| DailyRewardDisplay {
                date: day.date,
                total: micro_to_units(to_i128(day.total)),
                count: day.count,
            })
            .collect()
    }
}

/// Aggregates payments from the reward source to an entity.
pub struct RewardsCalculator<S> {
    store: Arc<S>,
    reward_source: String,
}

impl<S: LedgerStore> RewardsCalculator<S> {
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

    /// Reward transactions of `entity`, oldest first.
    pub fn reward_transactions(&self, entity: &Entity) -> Result<Vec<LedgerTransaction>> {
        self.store.query(
            &reward_filter(entity, &self.reward_source),
            TxOrder::OccurredAtAsc,
            Page::all(),
        )
    }

    /// Compute the rewards report. No rewards gives an all-zero report.
    pub fn compute(&self, entity: &Entity) -> Result<RewardsReport> {
        let rewards = self.reward_transactions(entity)?;

        let mut days: BTreeMap<NaiveDate, (u128, usize)> = BTreeMap::new();
        for tx in &rewards {
            let day = days.entry(utc_date(tx.occurred_at)).or_default();
            day.0 += u128::from(tx.amount);
            day.1 += 1;
        }

        Ok(RewardsReport {
            address: entity.address.clone(),
            display_name: entity.display_name.clone(),
            total_rewards: rewards.iter().map(|tx| u128::from(tx.amount)).sum(),
            transaction_count: rewards.len(),
            highest_reward: rewards.iter().map(|tx| tx.amount).max().unwrap_or(0),
            lowest_reward: rewards.iter().map(|tx| tx.amount).min().unwrap_or(0),
            daily: days
                .into_iter()
                .map(|(date, (total, count))| DailyReward { date, total, count })
                .collect(),
        })
    }
}

/// Payments from `reward_source` received by the entity.
pub(crate) fn reward_filter(entity: &Entity, reward_source: &str) -> TxFilter {
    TxFilter::for_entity(&entity.address)
        .sender(reward_source)
        .receiver(&entity.address)
}

fn utc_date(unix_secs: i64) -> NaiveDate {
    DateTime::from_timestamp(unix_secs, 0)
        .unwrap_or_default()
        .date_naive()
}

fn to_i128(value: u128) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}
