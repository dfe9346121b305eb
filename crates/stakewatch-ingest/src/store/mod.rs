//! Persistence for the ledger and the entity registry.
//!
//! The ledger is append-only and keyed by `(transaction_id, entity_address)`.
//! The registry owns entity metadata; its only post-creation mutation is the
//! first-writer-wins bootstrap assignment. Sync leases give every process
//! sharing the database one view of which entity is being synchronized.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use std::time::Duration;

use stakewatch_core::{Entity, LedgerTransaction, NewEntity, TxKind};

use crate::Result;

/// Append-only transaction storage.
pub trait LedgerStore: Send + Sync {
    /// Insert a transaction unless `(transaction_id, entity_address)` already exists.
    ///
    /// Returns `true` if the row was inserted, `false` if it was already present.
    fn insert_if_absent(&self, tx: &LedgerTransaction) -> Result<bool>;

    /// Highest `confirmed_round` stored for the entity, or 0 if none.
    fn latest_confirmed_round(&self, entity_address: &str) -> Result<u64>;

    /// Transactions matching `filter`, ordered and paginated.
    fn query(&self, filter: &TxFilter, order: TxOrder, page: Page)
    -> Result<Vec<LedgerTransaction>>;

    /// Number of transactions matching `filter`.
    fn count(&self, filter: &TxFilter) -> Result<u64>;

    /// Look up a single transaction.
    fn find(&self, entity_address: &str, transaction_id: &str)
    -> Result<Option<LedgerTransaction>>;
}

/// Entity metadata storage.
pub trait EntityRegistry: Send + Sync {
    fn get(&self, address: &str) -> Result<Option<Entity>>;

    /// All entities, in registration order.
    fn list(&self) -> Result<Vec<Entity>>;

    /// Register a new entity. Fails with `EntityExists` on a duplicate address.
    fn register(&self, new: NewEntity) -> Result<Entity>;

    /// Remove an entity from the registry. Its ledger rows are kept.
    fn remove(&self, address: &str) -> Result<bool>;

    /// Record the bootstrap transaction unless one is already set.
    ///
    /// Returns `true` if this call set it.
    fn set_bootstrap_once(&self, address: &str, transaction_id: &str) -> Result<bool>;
}

/// Cross-process exclusion for entity synchronization.
pub trait SyncLeases: Send + Sync {
    /// Take or renew the sync lease on `address` for `holder`.
    ///
    /// Succeeds when no lease exists, when `holder` already owns it, or when
    /// the current lease is older than `ttl`. Returns `false` if another
    /// holder owns a live lease.
    fn try_acquire_lease(&self, address: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Drop the lease on `address` if `holder` still owns it.
    fn release_lease(&self, address: &str, holder: &str) -> Result<()>;
}

/// Predicate over stored transactions of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxFilter {
    pub entity_address: String,
    pub kind: Option<TxKind>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    /// Exact fee match.
    pub fee: Option<u64>,
    /// Inclusive lower bound on `occurred_at`.
    pub occurred_since: Option<i64>,
    /// Substring match on the decoded note.
    pub note_contains: Option<String>,
}

impl TxFilter {
    pub fn for_entity(address: impl Into<String>) -> Self {
        Self {
            entity_address: address.into(),
            ..Default::default()
        }
    }

    pub fn kind(mut self, kind: TxKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn occurred_since(mut self, since: i64) -> Self {
        self.occurred_since = Some(since);
        self
    }

    pub fn note_contains(mut self, marker: impl Into<String>) -> Self {
        self.note_contains = Some(marker.into());
        self
    }

    /// Whether `tx` satisfies this filter.
    pub fn matches(&self, tx: &LedgerTransaction) -> bool {
        tx.entity_address == self.entity_address
            && self.kind.is_none_or(|k| tx.kind == k)
            && self.sender.as_deref().is_none_or(|s| tx.sender == s)
            && self
                .receiver
                .as_deref()
                .is_none_or(|r| tx.receiver.as_deref() == Some(r))
            && self.fee.is_none_or(|f| tx.fee == f)
            && self.occurred_since.is_none_or(|t| tx.occurred_at >= t)
            && self
                .note_contains
                .as_deref()
                .is_none_or(|m| tx.note_contains(m))
    }
}

/// Sort key for [`LedgerStore::query`]. Ties break on transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOrder {
    ConfirmedRoundAsc,
    ConfirmedRoundDesc,
    OccurredAtAsc,
}

/// Pagination window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Maximum rows to return; `None` for all.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub skip: u32,
}

impl Page {
    /// Every matching row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            skip: 0,
        }
    }

    pub fn new(limit: u32, skip: u32) -> Self {
        Self {
            limit: Some(limit),
            skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "CZMNXX6Z4EFY2I66O5ZLYJVE3E3WI3FAIGKCGZ7P6ZDTBSXY7BWW7TGS5Y";

    fn transfer() -> LedgerTransaction {
        LedgerTransaction {
            transaction_id: "TX1".to_string(),
            entity_address: ADDRESS.to_string(),
            kind: TxKind::Transfer,
            sender: "SENDER".to_string(),
            receiver: Some(ADDRESS.to_string()),
            amount: 100,
            fee: 1_000,
            confirmed_round: 10,
            occurred_at: 500,
            note: Some("ProposerPayout".to_string()),
        }
    }

    #[test]
    fn test_filter_matches_all_fields() {
        let tx = transfer();
        let filter = TxFilter::for_entity(ADDRESS)
            .kind(TxKind::Transfer)
            .sender("SENDER")
            .receiver(ADDRESS)
            .fee(1_000)
            .occurred_since(500)
            .note_contains("Proposer");
        assert!(filter.matches(&tx));
    }

    #[test]
    fn test_filter_rejects_mismatch() {
        let tx = transfer();
        assert!(!TxFilter::for_entity("OTHER").matches(&tx));
        assert!(!TxFilter::for_entity(ADDRESS).kind(TxKind::Registration).matches(&tx));
        assert!(!TxFilter::for_entity(ADDRESS).occurred_since(501).matches(&tx));
        assert!(!TxFilter::for_entity(ADDRESS).fee(2_000_000).matches(&tx));
        assert!(!TxFilter::for_entity(ADDRESS).note_contains("Other").matches(&tx));
    }

    #[test]
    fn test_page_constructors() {
        assert_eq!(Page::all().limit, None);
        assert_eq!(Page::first(1), Page { limit: Some(1), skip: 0 });
        assert_eq!(Page::new(20, 40).skip, 40);
    }
}
