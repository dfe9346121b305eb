//! Error types shared across stakewatch crates.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating or converting ledger data.
#[derive(Error, Debug)]
pub enum Error {
    /// Account address is not a well-formed ledger address.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Description of what's wrong.
        reason: String,
    },

    /// Amount string could not be converted to micro-units.
    #[error("invalid amount '{input}': {reason}")]
    InvalidAmount {
        /// The rejected input.
        input: String,
        /// Description of what's wrong.
        reason: String,
    },

    /// A record has an invalid field value.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },
}
