//! Incremental ledger synchronization.
//!
//! One synchronization of one entity:
//!
//! 1. Read the watermark (highest stored `confirmed_round`, 0 if none)
//! 2. Page through the indexer from `watermark + 1`
//! 3. Classify each record and insert it if absent
//! 4. On the first-ever sync, detect the bootstrap registration
//!
//! A first-ever sync follows continuation tokens until exhausted. Later syncs
//! fetch exactly one page and stop.
//!
//! Syncs of one entity never overlap: an in-process lock orders callers that
//! share an orchestrator, and a lease row in the store orders orchestrators
//! in different processes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use stakewatch_core::{Entity, LedgerTransaction, TxKind};

use super::bootstrap::BootstrapDetector;
use super::lock::{EntityLocks, SyncLease};
use crate::indexer::{IndexerClient, SearchPage, SearchQuery, classify};
use crate::store::{EntityRegistry, LedgerStore, SyncLeases};
use crate::{Config, Error, Result};

/// Sync tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Transactions requested per page.
    pub page_limit: u32,

    /// Upper bound on a single page fetch.
    pub fetch_timeout: Duration,

    /// Time between periodic cycles.
    pub sync_interval: Duration,

    /// Age after which a sync lease left by another process is taken over.
    pub lease_ttl: Duration,

    /// How often to retry while another process holds the lease.
    pub lease_poll: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: 500,
            fetch_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(900),
            lease_ttl: Duration::from_secs(600),
            lease_poll: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for SyncConfig {
    fn from(config: &Config) -> Self {
        Self {
            page_limit: config.page_limit,
            fetch_timeout: config.fetch_timeout,
            sync_interval: config.sync_interval,
            lease_ttl: config.sync_lease_ttl,
            ..Self::default()
        }
    }
}

/// Result of synchronizing one entity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    pub address: String,
    /// No transactions were stored before this sync.
    pub first_sync: bool,
    /// `min_round` sent to the indexer.
    pub start_round: u64,
    pub pages_fetched: usize,
    /// Raw records received.
    pub fetched: usize,
    pub inserted: usize,
    /// Records already stored.
    pub duplicates: usize,
    /// Records classified as `Other`.
    pub ignored: usize,
    pub malformed: usize,
    /// Bootstrap recorded by this sync.
    pub bootstrap_transaction_id: Option<String>,
    /// Highest stored round after the sync.
    pub watermark: u64,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Result of one pass over every registered entity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncCycleReport {
    pub entities: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub inserted: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Distinguishes orchestrators created in the same process.
static NEXT_HOLDER: AtomicU64 = AtomicU64::new(0);

/// Drives incremental fetch, classification, dedup insert and bootstrap
/// detection for tracked entities.
pub struct SyncOrchestrator<S, C> {
    store: Arc<S>,
    indexer: Arc<C>,
    detector: BootstrapDetector<S>,
    locks: EntityLocks,
    /// Lease holder name: process id plus a per-process sequence number.
    holder: String,
    config: SyncConfig,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl<S, C> SyncOrchestrator<S, C>
where
    S: LedgerStore + EntityRegistry + SyncLeases,
    C: IndexerClient,
{
    pub fn new(store: Arc<S>, indexer: Arc<C>, config: SyncConfig) -> Self {
        Self {
            detector: BootstrapDetector::new(store.clone()),
            store,
            indexer,
            locks: EntityLocks::new(),
            holder: format!(
                "{}:{}",
                std::process::id(),
                NEXT_HOLDER.fetch_add(1, Ordering::Relaxed)
            ),
            config,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Check if the periodic loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the periodic loop to stop after the current entity.
    ///
    /// A stop requested before [`run_periodic`](Self::run_periodic) starts
    /// makes it return without running a cycle.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Synchronize one entity.
    ///
    /// Concurrent calls for the same entity run one after the other, also
    /// across processes sharing the store. On a fetch or store failure the
    /// remaining pages are abandoned, rows already inserted stay committed,
    /// and the error is returned.
    pub async fn synchronize(&self, entity: &Entity) -> Result<SyncOutcome> {
        let _guard = self.locks.acquire(&entity.address).await;
        let start = Instant::now();
        counter!("sync_runs_total").increment(1);

        let result = match SyncLease::acquire(
            self.store.clone(),
            &entity.address,
            &self.holder,
            self.config.lease_ttl,
            self.config.lease_poll,
        )
        .await
        {
            Ok(lease) => self.synchronize_locked(entity, &lease, start).await,
            Err(e) => Err(e),
        };

        histogram!("sync_duration_seconds").record(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            counter!("sync_errors_total").increment(1);
            tracing::warn!(
                address = %entity.address,
                transient = e.is_transient(),
                "sync failed: {}",
                e
            );
        }

        result
    }

    /// Look up a registered entity and synchronize it.
    pub async fn synchronize_address(&self, address: &str) -> Result<SyncOutcome> {
        let entity = self
            .store
            .get(address)?
            .ok_or_else(|| Error::EntityNotFound(address.to_string()))?;
        self.synchronize(&entity).await
    }

    async fn synchronize_locked(
        &self,
        entity: &Entity,
        lease: &SyncLease<S>,
        start: Instant,
    ) -> Result<SyncOutcome> {
        let last_round = self.store.latest_confirmed_round(&entity.address)?;
        let first_sync = last_round == 0;

        let mut outcome = SyncOutcome {
            address: entity.address.clone(),
            first_sync,
            start_round: last_round + 1,
            ..Default::default()
        };

        tracing::debug!(
            address = %entity.address,
            last_round,
            first_sync,
            "starting sync"
        );

        let mut registrations: Vec<LedgerTransaction> = Vec::new();
        let mut query = SearchQuery {
            address: entity.address.clone(),
            min_round: outcome.start_round,
            limit: self.config.page_limit,
            next_token: None,
        };

        loop {
            let page = self.fetch_page(&query).await?;
            outcome.pages_fetched += 1;
            outcome.fetched += page.transactions.len();
            counter!("sync_pages_fetched_total").increment(1);

            self.ingest_page(entity, &page, &mut outcome, &mut registrations)?;
            lease.renew()?;

            if !first_sync || page.transactions.is_empty() {
                break;
            }
            match page.next_token {
                Some(next) if query.next_token.as_deref() != Some(next.as_str()) => {
                    query.next_token = Some(next);
                }
                _ => break,
            }
        }

        if first_sync && entity.bootstrap_transaction_id.is_none() {
            outcome.bootstrap_transaction_id = self.detector.detect(entity, &registrations)?;
        }

        outcome.watermark = self.store.latest_confirmed_round(&entity.address)?;
        outcome.duration = start.elapsed();

        tracing::info!(
            address = %entity.address,
            pages = outcome.pages_fetched,
            fetched = outcome.fetched,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            malformed = outcome.malformed,
            watermark = outcome.watermark,
            "sync complete in {:?}",
            outcome.duration
        );

        Ok(outcome)
    }

    async fn fetch_page(&self, query: &SearchQuery) -> Result<SearchPage> {
        match tokio::time::timeout(self.config.fetch_timeout, self.indexer.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Fetch(format!(
                "indexer page fetch timed out after {:?}",
                self.config.fetch_timeout
            ))),
        }
    }

    fn ingest_page(
        &self,
        entity: &Entity,
        page: &SearchPage,
        outcome: &mut SyncOutcome,
        registrations: &mut Vec<LedgerTransaction>,
    ) -> Result<()> {
        let mut inserted = 0u64;
        let mut duplicates = 0u64;
        let mut malformed = 0u64;

        for raw in &page.transactions {
            let tx = match classify(raw, &entity.address) {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    outcome.ignored += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(address = %entity.address, "skipping record: {}", e);
                    malformed += 1;
                    continue;
                }
            };

            if self.store.insert_if_absent(&tx)? {
                inserted += 1;
            } else {
                tracing::debug!(
                    address = %entity.address,
                    transaction_id = %tx.transaction_id,
                    "duplicate transaction skipped"
                );
                duplicates += 1;
            }

            if tx.kind == TxKind::Registration {
                registrations.push(tx);
            }
        }

        outcome.inserted += inserted as usize;
        outcome.duplicates += duplicates as usize;
        outcome.malformed += malformed as usize;
        counter!("sync_transactions_inserted_total").increment(inserted);
        counter!("sync_transactions_duplicate_total").increment(duplicates);
        counter!("sync_transactions_malformed_total").increment(malformed);

        Ok(())
    }

    /// Synchronize every registered entity once, sequentially.
    ///
    /// A failing entity is logged and counted; the cycle moves on. Entities
    /// not yet reached when [`stop`](Self::stop) is called are skipped.
    pub async fn sync_all(&self) -> Result<SyncCycleReport> {
        let start = Instant::now();
        let entities = self.store.list()?;
        gauge!("sync_entities_tracked").set(entities.len() as f64);

        let mut report = SyncCycleReport {
            entities: entities.len(),
            ..Default::default()
        };

        for entity in &entities {
            if self.stop_requested() {
                break;
            }
            match self.synchronize(entity).await {
                Ok(outcome) => {
                    report.succeeded += 1;
                    report.inserted += outcome.inserted;
                }
                Err(_) => report.failed += 1,
            }
        }

        report.duration = start.elapsed();
        gauge!("sync_last_cycle_unix").set(chrono::Utc::now().timestamp() as f64);

        tracing::info!(
            entities = report.entities,
            succeeded = report.succeeded,
            failed = report.failed,
            inserted = report.inserted,
            "sync cycle complete in {:?}",
            report.duration
        );

        Ok(report)
    }

    /// Run [`sync_all`](Self::sync_all) every `sync_interval` until [`stop`](Self::stop).
    pub async fn run_periodic(&self) -> Result<()> {
        if self.stop_requested() {
            tracing::info!("Stop requested before periodic sync started");
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        gauge!("sync_running").set(1.0);

        tracing::info!(
            "Starting periodic sync (interval: {}s)",
            self.config.sync_interval.as_secs()
        );

        while !self.stop_requested() {
            if let Err(e) = self.sync_all().await {
                tracing::error!("Sync cycle failed: {}", e);
                counter!("sync_errors_total").increment(1);
            }

            // Wait for the next interval (or until stopped)
            let interval = self.config.sync_interval;
            let start = Instant::now();
            while start.elapsed() < interval && !self.stop_requested() {
                tokio::time::sleep(Duration::from_secs(1).min(interval)).await;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        gauge!("sync_running").set(0.0);
        tracing::info!("Periodic sync stopped");
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
