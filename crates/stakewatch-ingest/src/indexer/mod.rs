//! Read-only access to an external ledger indexer.
//!
//! [`IndexerClient`] is the seam the sync orchestrator depends on;
//! [`HttpIndexer`] talks to a real indexer over HTTP.

mod classify;
mod http;

pub use classify::{KEYREG_TYPE, PAYMENT_TYPE, classify};
pub use http::HttpIndexer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One page request against the indexer's transaction search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub address: String,
    /// Only transactions confirmed at or after this round.
    pub min_round: u64,
    pub limit: u32,
    /// Continuation token from the previous page.
    pub next_token: Option<String>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,

    #[serde(rename = "next-token", default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// A transaction as returned by the indexer.
///
/// Every field is optional so a single incomplete record is rejected by
/// [`classify`] instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawTransaction {
    pub id: Option<String>,
    pub tx_type: Option<String>,
    pub sender: Option<String>,
    pub fee: Option<u64>,
    /// Unix seconds of the confirming block.
    pub round_time: Option<u64>,
    pub confirmed_round: Option<u64>,
    pub payment_transaction: Option<RawPayment>,
    /// Base64-encoded note bytes.
    pub note: Option<String>,
}

/// Payment details of a `pay` transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawPayment {
    pub amount: Option<u64>,
    pub receiver: Option<String>,
}

/// Paged transaction search.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Fetch one page. Transport, status and decode failures are `Error::Fetch`.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}
