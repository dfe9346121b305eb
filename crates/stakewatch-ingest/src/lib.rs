//! Stakewatch ledger ingestion.
//!
//! This crate keeps a local, append-only copy of each tracked entity's
//! ledger history, pulled incrementally from an external indexer.
//!
//! # Modules
//!
//! - [`store`] - SQLite ledger store and entity registry
//! - [`indexer`] - Indexer client trait, HTTP client and record classification
//! - [`sync`] - Sync orchestrator, bootstrap detection and per-entity exclusion
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  IndexerClient  │  /v2/transactions search, paged by continuation token
//! └────────┬────────┘
//!          │ RawTransaction
//!          ▼
//! ┌─────────────────┐
//! │    classify     │  Transfer / Registration / Other (dropped)
//! └────────┬────────┘
//!          │ LedgerTransaction
//!          ▼
//! ┌─────────────────┐
//! │   LedgerStore   │  SQLite, INSERT OR IGNORE on (transaction_id, entity_address)
//! └────────┬────────┘
//!          │ first sync
//!          ▼
//! ┌─────────────────┐
//! │BootstrapDetector│  Earliest qualifying registration, set once
//! └─────────────────┘
//! ```
//!
//! The indexer is trusted as ground truth. Each entity's watermark (highest
//! stored round) only moves forward.

pub mod config;
pub mod error;
pub mod indexer;
pub mod store;
pub mod sync;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Error, Result};

pub use indexer::{HttpIndexer, IndexerClient, RawTransaction, SearchPage, SearchQuery};
pub use store::{EntityRegistry, LedgerStore, Page, SqliteStore, SyncLeases, TxFilter, TxOrder};
pub use sync::{
    BootstrapDetector, EntityLocks, SyncConfig, SyncCycleReport, SyncLease, SyncOrchestrator,
    SyncOutcome, detect_late_bootstrap, resolve_bootstrap,
};
