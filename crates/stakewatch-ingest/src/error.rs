//! Error types for ledger synchronization.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during synchronization and store access.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Indexer unreachable, error response, undecodable page, or timeout.
    /// Aborts the current entity's sync; the next cycle retries.
    #[error("Indexer fetch failed: {0}")]
    Fetch(String),

    /// A fetched record is missing required fields or carries invalid values.
    #[error("Malformed transaction {}: {reason}", id.as_deref().unwrap_or("<no id>"))]
    Malformed {
        /// Transaction id, when the record had one.
        id: Option<String>,
        /// Description of what's wrong.
        reason: String,
    },

    /// No entity is registered under this address.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Another process took over this entity's sync lease mid-sync.
    #[error("Sync lease lost for {0}")]
    LeaseLost(String),

    /// An entity with this address is already registered.
    #[error("Entity already exists: {0}")]
    EntityExists(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Domain validation error.
    #[error(transparent)]
    Core(#[from] stakewatch_core::Error),
}

impl Error {
    /// Whether the failure is expected to clear on a later sync cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::LeaseLost(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}
