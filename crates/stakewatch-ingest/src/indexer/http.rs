//! HTTP indexer client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{IndexerClient, SearchPage, SearchQuery};
use crate::{Error, Result};

/// Header carrying the indexer API token.
const TOKEN_HEADER: &str = "X-Indexer-API-Token";

/// Indexer client speaking the `/v2/transactions` search API.
#[derive(Clone)]
pub struct HttpIndexer {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpIndexer {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn search_url(&self) -> String {
        format!("{}/v2/transactions", self.base_url)
    }

    fn search_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("address", query.address.clone()),
            ("min-round", query.min_round.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(next) = &query.next_token {
            params.push(("next", next.clone()));
        }
        params
    }
}

#[async_trait]
impl IndexerClient for HttpIndexer {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let mut request = self
            .client
            .get(self.search_url())
            .query(&Self::search_params(query));
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Fetch(format!(
                "indexer returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let page = resp
            .json::<SearchPage>()
            .await
            .map_err(|e| Error::Fetch(format!("failed to decode indexer page: {}", e)))?;

        tracing::trace!(
            address = %query.address,
            min_round = query.min_round,
            count = page.transactions.len(),
            has_next = page.next_token.is_some(),
            "fetched indexer page"
        );

        Ok(page)
    }
}
