//! Combined per-entity reports and ledger listing.

use std::sync::Arc;

use serde::Serialize;
use stakewatch_core::{Entity, LedgerTransaction, REWARD_SOURCE_ADDRESS};
use stakewatch_ingest::{EntityRegistry, Error, LedgerStore, Page, TxFilter, TxOrder};

use crate::Result;
use crate::apr::{AprDisplay, AprEstimator, AprReport};
use crate::balance::{BalanceCalculator, BalanceDisplay, BalanceReport};
use crate::rewards::{RewardsCalculator, RewardsDisplay, RewardsReport, reward_filter};

/// Everything known about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    pub entity: Entity,
    pub balance: BalanceReport,
    pub rewards: RewardsReport,
    pub apr: AprReport,
    pub reward_transaction_count: u64,
    pub ledger_transaction_count: u64,
    /// Highest stored round.
    pub watermark: u64,
}

/// [`EntitySummary`] in display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySummaryDisplay {
    pub entity: Entity,
    pub balance: BalanceDisplay,
    pub rewards: RewardsDisplay,
    pub apr: AprDisplay,
    pub reward_transaction_count: u64,
    pub ledger_transaction_count: u64,
    pub watermark: u64,
}

impl EntitySummary {
    pub fn display(&self) -> EntitySummaryDisplay {
        EntitySummaryDisplay {
            entity: self.entity.clone(),
            balance: self.balance.display(),
            rewards: self.rewards.display(),
            apr: self.apr.display(),
            reward_transaction_count: self.reward_transaction_count,
            ledger_transaction_count: self.ledger_transaction_count,
            watermark: self.watermark,
        }
    }
}

/// One page of an entity's ledger, newest round first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionListing {
    pub address: String,
    /// Matching rows across all pages.
    pub total: u64,
    pub limit: u32,
    pub skip: u32,
    pub transactions: Vec<LedgerTransaction>,
}

/// Read-side entry point over a store.
pub struct Reporter<S> {
    store: Arc<S>,
    reward_source: String,
}

impl<S> Reporter<S>
where
    S: LedgerStore + EntityRegistry,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            reward_source: REWARD_SOURCE_ADDRESS.to_string(),
        }
    }

    pub fn with_reward_source(mut self, source: impl Into<String>) -> Self {
        self.reward_source = source.into();
        self
    }

    /// Look up a registered entity.
    pub fn entity(&self, address: &str) -> Result<Entity> {
        self.store
            .get(address)?
            .ok_or_else(|| Error::EntityNotFound(address.to_string()))
    }

    pub fn balance(&self, entity: &Entity) -> Result<BalanceReport> {
        BalanceCalculator::new(self.store.clone()).compute(entity)
    }

    pub fn rewards(&self, entity: &Entity) -> Result<RewardsReport> {
        RewardsCalculator::new(self.store.clone())
            .with_reward_source(&self.reward_source)
            .compute(entity)
    }

    pub fn apr(&self, entity: &Entity) -> Result<AprReport> {
        AprEstimator::new(self.store.clone())
            .with_reward_source(&self.reward_source)
            .estimate(entity)
    }

    /// All reports for one entity.
    ///
    /// The balance runs first; a bootstrap it finds by late detection is
    /// visible to the APR estimate that follows.
    pub fn summary(&self, address: &str) -> Result<EntitySummary> {
        let entity = self.entity(address)?;
        let balance = self.balance(&entity)?;

        let entity = if entity.bootstrap_transaction_id.is_none() {
            self.entity(address)?
        } else {
            entity
        };

        let rewards = self.rewards(&entity)?;
        let apr = self.apr(&entity)?;
        let reward_transaction_count = self
            .store
            .count(&reward_filter(&entity, &self.reward_source))?;
        let ledger_transaction_count = self.store.count(&TxFilter::for_entity(address))?;
        let watermark = self.store.latest_confirmed_round(address)?;

        Ok(EntitySummary {
            entity,
            balance,
            rewards,
            apr,
            reward_transaction_count,
            ledger_transaction_count,
            watermark,
        })
    }

    /// A page of the entity's stored transactions, newest round first.
    pub fn transactions(&self, address: &str, limit: u32, skip: u32) -> Result<TransactionListing> {
        let filter = TxFilter::for_entity(address);
        let total = self.store.count(&filter)?;
        let transactions =
            self.store
                .query(&filter, TxOrder::ConfirmedRoundDesc, Page::new(limit, skip))?;

        Ok(TransactionListing {
            address: address.to_string(),
            total,
            limit,
            skip,
            transactions,
        })
    }
}
