//! Configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use stakewatch_core::REWARD_SOURCE_ADDRESS;

use crate::{Error, Result};

/// Default public indexer endpoint.
pub const DEFAULT_INDEXER_URL: &str = "https://mainnet-idx.4160.nodely.dev";

/// Sync daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,

    /// Indexer base URL.
    pub indexer_url: String,

    /// Optional indexer API token, sent as `X-Indexer-API-Token`.
    pub indexer_token: Option<String>,

    /// Transactions requested per page.
    pub page_limit: u32,

    /// Upper bound on a single page fetch.
    pub fetch_timeout: Duration,

    /// Time between periodic sync cycles.
    pub sync_interval: Duration,

    /// Age after which another process may take over an entity's sync lease.
    pub sync_lease_ttl: Duration,

    /// Sender whose payments count as rewards.
    pub reward_source: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/stakewatch.db"),
            indexer_url: DEFAULT_INDEXER_URL.to_string(),
            indexer_token: None,
            page_limit: 500,
            fetch_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(900), // 15 minutes
            sync_lease_ttl: Duration::from_secs(600),
            reward_source: REWARD_SOURCE_ADDRESS.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `STAKEWATCH_DB_PATH`: SQLite file (default: "./data/stakewatch.db")
    /// - `INDEXER_URL`: Indexer base URL (default: public mainnet indexer)
    /// - `INDEXER_TOKEN`: Indexer API token
    /// - `INDEXER_PAGE_LIMIT`: Transactions per page (default: 500)
    /// - `INDEXER_TIMEOUT_SECS`: Per-page fetch timeout (default: 30)
    /// - `SYNC_INTERVAL_SECS`: Seconds between sync cycles (default: 900)
    /// - `SYNC_LEASE_TTL_SECS`: Seconds before an abandoned sync lease expires (default: 600)
    /// - `REWARD_SOURCE_ADDRESS`: Reward sender (default: mainnet reward source)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let db_path = std::env::var("STAKEWATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let indexer_url = std::env::var("INDEXER_URL")
            .unwrap_or(defaults.indexer_url)
            .trim_end_matches('/')
            .to_string();

        let indexer_token = std::env::var("INDEXER_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let page_limit = parse_env("INDEXER_PAGE_LIMIT")?.unwrap_or(defaults.page_limit);
        if page_limit == 0 {
            return Err(Error::Config("INDEXER_PAGE_LIMIT must be positive".to_string()));
        }

        let fetch_timeout = match parse_env::<u64>("INDEXER_TIMEOUT_SECS")? {
            Some(0) => {
                return Err(Error::Config(
                    "INDEXER_TIMEOUT_SECS must be positive".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.fetch_timeout,
        };

        let sync_interval = parse_env::<u64>("SYNC_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.sync_interval);

        let sync_lease_ttl = match parse_env::<u64>("SYNC_LEASE_TTL_SECS")? {
            Some(0) => {
                return Err(Error::Config(
                    "SYNC_LEASE_TTL_SECS must be positive".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.sync_lease_ttl,
        };

        let reward_source = match std::env::var("REWARD_SOURCE_ADDRESS") {
            Ok(address) => {
                let address = address.trim().to_string();
                stakewatch_core::validate_address(&address)?;
                address
            }
            Err(_) => defaults.reward_source,
        };

        tracing::info!(
            db_path = %db_path.display(),
            indexer_url = %indexer_url,
            page_limit,
            fetch_timeout_secs = fetch_timeout.as_secs(),
            sync_interval_secs = sync_interval.as_secs(),
            sync_lease_ttl_secs = sync_lease_ttl.as_secs(),
            "configuration loaded"
        );

        Ok(Self {
            db_path,
            indexer_url,
            indexer_token,
            page_limit,
            fetch_timeout,
            sync_interval,
            sync_lease_ttl,
            reward_source,
        })
    }
}

/// Parse an optional numeric environment variable.
fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} must be a number: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize config tests that manipulate env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "STAKEWATCH_DB_PATH",
        "INDEXER_URL",
        "INDEXER_TOKEN",
        "INDEXER_PAGE_LIMIT",
        "INDEXER_TIMEOUT_SECS",
        "SYNC_INTERVAL_SECS",
        "SYNC_LEASE_TTL_SECS",
        "REWARD_SOURCE_ADDRESS",
    ];

    /// Helper to run config tests with isolated env vars.
    fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();

        let saved: Vec<_> = ENV_KEYS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        // SAFETY: Serialized by mutex; only test code touches these vars.
        unsafe {
            for k in ENV_KEYS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        f();

        // SAFETY: Restoring original env state.
        unsafe {
            for (k, v) in &saved {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn config_defaults() {
        with_env_vars(&[], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.db_path, PathBuf::from("./data/stakewatch.db"));
            assert_eq!(config.indexer_url, DEFAULT_INDEXER_URL);
            assert!(config.indexer_token.is_none());
            assert_eq!(config.page_limit, 500);
            assert_eq!(config.fetch_timeout, Duration::from_secs(30));
            assert_eq!(config.sync_interval, Duration::from_secs(900));
            assert_eq!(config.sync_lease_ttl, Duration::from_secs(600));
            assert_eq!(config.reward_source, REWARD_SOURCE_ADDRESS);
        });
    }

    #[test]
    fn config_custom_values() {
        with_env_vars(
            &[
                ("STAKEWATCH_DB_PATH", "/var/lib/stakewatch.db"),
                ("INDEXER_URL", "http://localhost:8980/"),
                ("INDEXER_TOKEN", "secret"),
                ("INDEXER_PAGE_LIMIT", "100"),
                ("INDEXER_TIMEOUT_SECS", "5"),
                ("SYNC_INTERVAL_SECS", "60"),
                ("SYNC_LEASE_TTL_SECS", "120"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.db_path, PathBuf::from("/var/lib/stakewatch.db"));
                assert_eq!(config.indexer_url, "http://localhost:8980");
                assert_eq!(config.indexer_token.as_deref(), Some("secret"));
                assert_eq!(config.page_limit, 100);
                assert_eq!(config.fetch_timeout, Duration::from_secs(5));
                assert_eq!(config.sync_interval, Duration::from_secs(60));
                assert_eq!(config.sync_lease_ttl, Duration::from_secs(120));
            },
        );
    }

    #[test]
    fn config_blank_token_is_none() {
        with_env_vars(&[("INDEXER_TOKEN", "  ")], || {
            let config = Config::from_env().unwrap();
            assert!(config.indexer_token.is_none());
        });
    }

    #[test]
    fn config_rejects_non_numeric_limit() {
        with_env_vars(&[("INDEXER_PAGE_LIMIT", "lots")], || {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, Error::Config(_)));
            assert!(err.to_string().contains("INDEXER_PAGE_LIMIT"));
        });
    }

    #[test]
    fn config_rejects_zero_timeout() {
        with_env_vars(&[("INDEXER_TIMEOUT_SECS", "0")], || {
            assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        });
    }

    #[test]
    fn config_rejects_zero_lease_ttl() {
        with_env_vars(&[("SYNC_LEASE_TTL_SECS", "0")], || {
            assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        });
    }

    #[test]
    fn config_rejects_invalid_reward_source() {
        with_env_vars(&[("REWARD_SOURCE_ADDRESS", "nope")], || {
            assert!(matches!(Config::from_env(), Err(Error::Core(_))));
        });
    }
}
