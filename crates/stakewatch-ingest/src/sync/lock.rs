//! Per-entity exclusion for synchronization.
//!
//! Two layers: [`EntityLocks`] serializes syncs inside one process without
//! touching the database, and [`SyncLease`] serializes them across every
//! process sharing the store (the daemon and an on-demand `sync` command).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::store::SyncLeases;
use crate::{Error, Result};

/// Keyed async locks, one per entity address.
///
/// Two syncs of the same entity serialize; syncs of different entities don't
/// contend.
#[derive(Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `address`. Released when the guard drops.
    pub async fn acquire(&self, address: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(address.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// A held sync lease on one entity. Released when dropped.
pub struct SyncLease<S: SyncLeases> {
    store: Arc<S>,
    address: String,
    holder: String,
    ttl: Duration,
}

impl<S: SyncLeases> SyncLease<S> {
    /// Wait until the lease on `address` can be taken, checking every `poll`.
    ///
    /// A lease left behind by a crashed process is taken over once it is
    /// older than `ttl`.
    pub async fn acquire(
        store: Arc<S>,
        address: &str,
        holder: &str,
        ttl: Duration,
        poll: Duration,
    ) -> Result<Self> {
        let mut waiting = false;
        while !store.try_acquire_lease(address, holder, ttl)? {
            if !waiting {
                tracing::info!(address = %address, "entity is being synchronized elsewhere, waiting");
                metrics::counter!("sync_lease_waits_total").increment(1);
                waiting = true;
            }
            tokio::time::sleep(poll).await;
        }

        Ok(Self {
            store,
            address: address.to_string(),
            holder: holder.to_string(),
            ttl,
        })
    }

    /// Refresh the lease so a long sync is not mistaken for an abandoned one.
    pub fn renew(&self) -> Result<()> {
        if self
            .store
            .try_acquire_lease(&self.address, &self.holder, self.ttl)?
        {
            Ok(())
        } else {
            Err(Error::LeaseLost(self.address.clone()))
        }
    }
}

impl<S: SyncLeases> Drop for SyncLease<S> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lease(&self.address, &self.holder) {
            tracing::warn!(address = %self.address, "failed to release sync lease: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    const TTL: Duration = Duration::from_secs(60);
    const POLL: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_same_address_serializes() {
        let locks = Arc::new(EntityLocks::new());
        let guard = locks.acquire("A").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("A").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_addresses_do_not_contend() {
        let locks = EntityLocks::new();
        let _a = locks.acquire("A").await;
        tokio::time::timeout(Duration::from_secs(1), locks.acquire("B"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lease_waits_for_other_holder() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let first = SyncLease::acquire(store.clone(), "A", "daemon", TTL, POLL)
            .await
            .unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                SyncLease::acquire(store, "A", "cli", TTL, POLL)
                    .await
                    .map(drop)
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // Released again once the waiter's guard dropped
        assert!(store.try_acquire_lease("A", "other", TTL).unwrap());
    }

    #[tokio::test]
    async fn test_renew_fails_after_takeover() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let lease = SyncLease::acquire(store.clone(), "A", "slow", Duration::from_millis(5), POLL)
            .await
            .unwrap();
        lease.renew().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store
            .try_acquire_lease("A", "fresh", Duration::from_millis(5))
            .unwrap());

        assert!(matches!(lease.renew(), Err(Error::LeaseLost(_))));

        // Dropping the stale guard leaves the new owner's lease alone
        drop(lease);
        assert!(!store.try_acquire_lease("A", "third", TTL).unwrap());
    }
}
