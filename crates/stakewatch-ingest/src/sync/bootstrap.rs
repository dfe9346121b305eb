//! Bootstrap detection.
//!
//! The bootstrap transaction is the earliest qualifying key registration sent
//! by an entity. Its time opens the window in which proposer payouts count as
//! rewards. It is recorded on the entity at most once.

use std::sync::Arc;

use stakewatch_core::{BOOTSTRAP_FEE_THRESHOLD, Entity, LedgerTransaction, TxKind};

use crate::Result;
use crate::store::{EntityRegistry, LedgerStore, Page, TxFilter, TxOrder};

/// Picks and records the bootstrap transaction from freshly synced registrations.
pub struct BootstrapDetector<S> {
    store: Arc<S>,
}

impl<S> BootstrapDetector<S>
where
    S: LedgerStore + EntityRegistry,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Select the lowest-round qualifying registration among `candidates` and
    /// record it on the entity.
    ///
    /// Qualifying means kind `Registration`, sent by the entity, fee at least
    /// [`BOOTSTRAP_FEE_THRESHOLD`]. On equal rounds the first candidate wins.
    /// Returns the recorded id, or `None` if nothing qualified or the entity
    /// already had a bootstrap.
    pub fn detect(
        &self,
        entity: &Entity,
        candidates: &[LedgerTransaction],
    ) -> Result<Option<String>> {
        if entity.bootstrap_transaction_id.is_some() {
            return Ok(None);
        }

        let Some(earliest) = candidates
            .iter()
            .filter(|tx| {
                tx.kind == TxKind::Registration
                    && tx.sender == entity.address
                    && tx.fee >= BOOTSTRAP_FEE_THRESHOLD
            })
            .min_by_key(|tx| tx.confirmed_round)
        else {
            return Ok(None);
        };

        if !self
            .store
            .set_bootstrap_once(&entity.address, &earliest.transaction_id)?
        {
            tracing::debug!(
                address = %entity.address,
                "bootstrap already recorded, keeping existing"
            );
            return Ok(None);
        }

        metrics::counter!("sync_bootstrap_detected_total").increment(1);
        tracing::info!(
            address = %entity.address,
            transaction_id = %earliest.transaction_id,
            round = earliest.confirmed_round,
            occurred_at = earliest.occurred_at,
            "bootstrap transaction detected"
        );

        Ok(Some(earliest.transaction_id.clone()))
    }
}

/// Scan already-stored registrations for a bootstrap the entity never got.
///
/// Matches registrations sent by the entity whose fee is exactly
/// [`BOOTSTRAP_FEE_THRESHOLD`], lowest round first, and records the match.
/// Returns the entity's bootstrap transaction afterwards, which may be one
/// recorded concurrently by another writer.
pub fn detect_late_bootstrap<S>(store: &S, entity: &Entity) -> Result<Option<LedgerTransaction>>
where
    S: LedgerStore + EntityRegistry + ?Sized,
{
    let filter = TxFilter::for_entity(&entity.address)
        .kind(TxKind::Registration)
        .sender(&entity.address)
        .fee(BOOTSTRAP_FEE_THRESHOLD);

    let Some(earliest) = store
        .query(&filter, TxOrder::ConfirmedRoundAsc, Page::first(1))?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };

    if store.set_bootstrap_once(&entity.address, &earliest.transaction_id)? {
        tracing::info!(
            address = %entity.address,
            transaction_id = %earliest.transaction_id,
            round = earliest.confirmed_round,
            "late bootstrap transaction detected"
        );
        return Ok(Some(earliest));
    }

    // Lost the race: report whatever the registry holds now.
    match store.get(&entity.address)?.and_then(|e| e.bootstrap_transaction_id) {
        Some(id) => store.find(&entity.address, &id),
        None => Ok(None),
    }
}

/// The entity's bootstrap transaction, falling back to late detection when
/// none is recorded.
pub fn resolve_bootstrap<S>(store: &S, entity: &Entity) -> Result<Option<LedgerTransaction>>
where
    S: LedgerStore + EntityRegistry + ?Sized,
{
    match &entity.bootstrap_transaction_id {
        Some(id) => {
            let tx = store.find(&entity.address, id)?;
            if tx.is_none() {
                tracing::warn!(
                    address = %entity.address,
                    transaction_id = %id,
                    "recorded bootstrap transaction is not in the ledger"
                );
            }
            Ok(tx)
        }
        None => detect_late_bootstrap(store, entity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use stakewatch_core::NewEntity;

    const ADDRESS: &str = "CZMNXX6Z4EFY2I66O5ZLYJVE3E3WI3FAIGKCGZ7P6ZDTBSXY7BWW7TGS5Y";
    const OTHER: &str = "Y76M3MSY6DKBRHBL7C3NNDXGS5IIMQVQVUAB6MP4XEMMGVF2QWNPL226CA";

    fn setup() -> (Arc<SqliteStore>, Entity) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let entity = store
            .register(NewEntity {
                address: ADDRESS.to_string(),
                display_name: None,
                initial_balance: 1_000_000_000_000,
            })
            .unwrap();
        (store, entity)
    }

    fn registration(id: &str, round: u64, fee: u64) -> LedgerTransaction {
        LedgerTransaction {
            transaction_id: id.to_string(),
            entity_address: ADDRESS.to_string(),
            kind: TxKind::Registration,
            sender: ADDRESS.to_string(),
            receiver: None,
            amount: 0,
            fee,
            confirmed_round: round,
            occurred_at: round as i64 * 3,
            note: None,
        }
    }

    #[test]
    fn test_detect_picks_earliest_round() {
        let (store, entity) = setup();
        let detector = BootstrapDetector::new(store.clone());

        let candidates = vec![
            registration("R9", 9, 2_000_000),
            registration("R3", 3, 2_000_000),
            registration("R5", 5, 2_000_000),
        ];

        let found = detector.detect(&entity, &candidates).unwrap();
        assert_eq!(found.as_deref(), Some("R3"));

        let stored = store.get(ADDRESS).unwrap().unwrap();
        assert_eq!(stored.bootstrap_transaction_id.as_deref(), Some("R3"));
    }

    #[test]
    fn test_detect_skips_non_qualifying() {
        let (store, entity) = setup();
        let detector = BootstrapDetector::new(store.clone());

        let mut foreign = registration("FOREIGN", 1, 2_000_000);
        foreign.sender = OTHER.to_string();
        let cheap = registration("CHEAP", 2, 1_000);

        assert!(detector.detect(&entity, &[foreign, cheap]).unwrap().is_none());
        assert!(store.get(ADDRESS).unwrap().unwrap().bootstrap_transaction_id.is_none());

        let above = registration("ABOVE", 7, 3_000_000);
        assert_eq!(
            detector.detect(&entity, &[above]).unwrap().as_deref(),
            Some("ABOVE")
        );
    }

    #[test]
    fn test_detect_is_first_writer_wins() {
        let (store, entity) = setup();
        let detector = BootstrapDetector::new(store.clone());

        detector
            .detect(&entity, &[registration("FIRST", 10, 2_000_000)])
            .unwrap();

        // Stale entity snapshot: the registry still refuses the overwrite
        let second = detector
            .detect(&entity, &[registration("EARLIER", 1, 2_000_000)])
            .unwrap();
        assert!(second.is_none());

        let stored = store.get(ADDRESS).unwrap().unwrap();
        assert_eq!(stored.bootstrap_transaction_id.as_deref(), Some("FIRST"));

        // Fresh snapshot short-circuits
        assert!(detector.detect(&stored, &[]).unwrap().is_none());
    }

    #[test]
    fn test_late_detection_requires_exact_fee() {
        let (store, entity) = setup();
        store.insert_if_absent(&registration("HIGH", 2, 3_000_000)).unwrap();
        store.insert_if_absent(&registration("EXACT8", 8, 2_000_000)).unwrap();
        store.insert_if_absent(&registration("EXACT4", 4, 2_000_000)).unwrap();

        let found = detect_late_bootstrap(store.as_ref(), &entity).unwrap().unwrap();
        assert_eq!(found.transaction_id, "EXACT4");

        let stored = store.get(ADDRESS).unwrap().unwrap();
        assert_eq!(stored.bootstrap_transaction_id.as_deref(), Some("EXACT4"));
    }

    #[test]
    fn test_late_detection_without_match() {
        let (store, entity) = setup();
        store.insert_if_absent(&registration("HIGH", 2, 3_000_000)).unwrap();

        assert!(detect_late_bootstrap(store.as_ref(), &entity).unwrap().is_none());
    }

    #[test]
    fn test_resolve_prefers_recorded() {
        let (store, entity) = setup();
        store.insert_if_absent(&registration("EXACT", 4, 2_000_000)).unwrap();
        store.insert_if_absent(&registration("HIGH", 9, 3_000_000)).unwrap();
        store.set_bootstrap_once(ADDRESS, "HIGH").unwrap();

        let entity = store.get(&entity.address).unwrap().unwrap();
        let found = resolve_bootstrap(store.as_ref(), &entity).unwrap().unwrap();
        assert_eq!(found.transaction_id, "HIGH");
    }
}
