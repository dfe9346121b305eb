//! Incremental synchronization of tracked entities.
//!
//! The [`SyncOrchestrator`] pulls new transactions for one entity at a time
//! from an [`IndexerClient`](crate::indexer::IndexerClient), classifies them,
//! inserts them into the [`LedgerStore`](crate::store::LedgerStore) exactly once
//! and, on an entity's first sync, records its bootstrap registration.
//!
//! ```text
//! ┌──────────────────┐       ┌──────────────────┐
//! │  Periodic Timer  │       │ On-demand Trigger│
//! │  (run_periodic)  │       │ (sync <address>) │
//! └────────┬─────────┘       └────────┬─────────┘
//!          │                          │
//!          └──────────┬───────────────┘
//!                     │  EntityLocks + SyncLease (one sync per entity)
//!                     ▼
//!          ┌──────────────────────────┐
//!          │  fetch → classify →      │
//!          │  insert-if-absent        │
//!          └────────────┬─────────────┘
//!                       │ first sync only
//!                       ▼
//!          ┌──────────────────────────┐
//!          │    BootstrapDetector     │
//!          └──────────────────────────┘
//! ```

mod bootstrap;
mod lock;
mod orchestrator;

pub use bootstrap::{BootstrapDetector, detect_late_bootstrap, resolve_bootstrap};
pub use lock::{EntityLocks, SyncLease};
pub use orchestrator::{SyncConfig, SyncCycleReport, SyncOrchestrator, SyncOutcome};
