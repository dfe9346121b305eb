//! Balance reconstruction from the stored ledger.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use stakewatch_core::{Entity, PROPOSER_PAYOUT_MARKER, TxKind, micro_to_units};
use stakewatch_ingest::sync::resolve_bootstrap;
use stakewatch_ingest::{EntityRegistry, LedgerStore, Page, TxFilter, TxOrder};

use crate::Result;

/// Reconstructed balance of one entity, in micro-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub address: String,
    pub display_name: String,
    pub initial_balance: u64,
    /// Fees of registrations sent by the entity.
    pub key_reg_fees: u128,
    /// Fees of every stored transaction sent by the entity.
    pub total_fees_paid: u128,
    /// Proposer payouts received since the bootstrap.
    pub total_rewards_received: u128,
    pub final_balance: i128,
    pub bootstrap_transaction_id: Option<String>,
    /// `occurred_at` of the bootstrap transaction.
    pub start_time: Option<i64>,
}

/// [`BalanceReport`] in display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDisplay {
    pub address: String,
    pub display_name: String,
    pub initial_balance: Decimal,
    pub key_reg_fees: Decimal,
    pub total_fees_paid: Decimal,
    pub total_rewards_received: Decimal,
    pub final_balance: Decimal,
    pub bootstrap_transaction_id: Option<String>,
    pub start_time: Option<i64>,
}

impl BalanceReport {
    /// Balance of an entity with no known bootstrap: the initial balance, untouched.
    fn unbootstrapped(entity: &Entity) -> Self {
        Self {
            address: entity.address.clone(),
            display_name: entity.display_name.clone(),
            initial_balance: entity.initial_balance,
            key_reg_fees: 0,
            total_fees_paid: 0,
            total_rewards_received: 0,
            final_balance: i128::from(entity.initial_balance),
            bootstrap_transaction_id: None,
            start_time: None,
        }
    }

    pub fn display(&self) -> BalanceDisplay {
        BalanceDisplay {
            address: self.address.clone(),
            display_name: self.display_name.clone(),
            initial_balance: micro_to_units(i128::from(self.initial_balance)),
            key_reg_fees: micro_to_units(to_i128(self.key_reg_fees)),
            total_fees_paid: micro_to_units(to_i128(self.total_fees_paid)),
            total_rewards_received: micro_to_units(to_i128(self.total_rewards_received)),
            final_balance: micro_to_units(self.final_balance),
            bootstrap_transaction_id: self.bootstrap_transaction_id.clone(),
            start_time: self.start_time,
        }
    }
}

/// Computes an entity's balance from its initial balance, the fees it paid and
/// the proposer payouts it received since its bootstrap.
pub struct BalanceCalculator<S> {
    store: Arc<S>,
}

impl<S> BalanceCalculator<S>
where
    S: LedgerStore + EntityRegistry,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Compute the balance report.
    ///
    /// Without a bootstrap transaction (recorded, or found by late detection)
    /// the ledger isn't scanned and the final balance is the initial balance.
    pub fn compute(&self, entity: &Entity) -> Result<BalanceReport> {
        let Some(bootstrap) = resolve_bootstrap(self.store.as_ref(), entity)? else {
            tracing::debug!(address = %entity.address, "no bootstrap, balance is initial");
            return Ok(BalanceReport::unbootstrapped(entity));
        };
        let start_time = bootstrap.occurred_at;

        let sent = self.store.query(
            &TxFilter::for_entity(&entity.address).sender(&entity.address),
            TxOrder::ConfirmedRoundAsc,
            Page::all(),
        )?;
        let total_fees_paid: u128 = sent.iter().map(|tx| u128::from(tx.fee)).sum();
        let key_reg_fees: u128 = sent
            .iter()
            .filter(|tx| tx.kind == TxKind::Registration)
            .map(|tx| u128::from(tx.fee))
            .sum();

        let payouts = self.store.query(
            &TxFilter::for_entity(&entity.address)
                .kind(TxKind::Transfer)
                .receiver(&entity.address)
                .occurred_since(start_time)
                .note_contains(PROPOSER_PAYOUT_MARKER),
            TxOrder::OccurredAtAsc,
            Page::all(),
        )?;
        let total_rewards_received: u128 = payouts.iter().map(|tx| u128::from(tx.amount)).sum();

        let final_balance = i128::from(entity.initial_balance) - to_i128(total_fees_paid)
            + to_i128(total_rewards_received);

        Ok(BalanceReport {
            address: entity.address.clone(),
            display_name: entity.display_name.clone(),
            initial_balance: entity.initial_balance,
            key_reg_fees,
            total_fees_paid,
            total_rewards_received,
            final_balance,
            bootstrap_transaction_id: Some(bootstrap.transaction_id),
            start_time: Some(start_time),
        })
    }
}

/// Sums of u64 values stay far below `i128::MAX`.
fn to_i128(value: u128) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}
