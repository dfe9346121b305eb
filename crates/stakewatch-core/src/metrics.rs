//! Prometheus metrics helpers for stakewatch.
//!
//! This module provides centralized metrics initialization and the metric
//! descriptions used by the sync daemon.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stakewatch_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("sync_runs_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`sync_`)
//! - Suffix: unit or type (`_total`, `_seconds`, `_unix`)
//! - No per-entity labels: entity addresses would explode cardinality

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_sync_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_sync_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves `/metrics` on the given port from a background task and returns
/// once the listener is bound.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the sync metrics.
fn register_sync_metrics() {
    // =========================================================================
    // Sync cycle
    // =========================================================================

    describe_counter!("sync_runs_total", "Entity synchronizations attempted");
    describe_counter!(
        "sync_errors_total",
        "Entity synchronizations aborted by a fetch or store failure"
    );
    describe_histogram!(
        "sync_duration_seconds",
        "Wall time of a single entity synchronization"
    );
    describe_gauge!(
        "sync_running",
        "Whether the periodic sync loop is running (1=yes, 0=no)"
    );
    describe_gauge!("sync_entities_tracked", "Entities in the registry");
    describe_counter!(
        "sync_lease_waits_total",
        "Syncs that waited for another process to finish the same entity"
    );
    describe_gauge!(
        "sync_last_cycle_unix",
        "Unix time at which the last full sync cycle finished"
    );

    // =========================================================================
    // Ingestion
    // =========================================================================

    describe_counter!("sync_pages_fetched_total", "Indexer pages fetched");
    describe_counter!(
        "sync_transactions_inserted_total",
        "Ledger transactions newly stored"
    );
    describe_counter!(
        "sync_transactions_duplicate_total",
        "Fetched transactions already present in the store"
    );
    describe_counter!(
        "sync_transactions_malformed_total",
        "Fetched transactions skipped because of missing or invalid fields"
    );
    describe_counter!(
        "sync_bootstrap_detected_total",
        "Bootstrap registrations recorded for entities"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();

        // At most one should succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_register_sync_metrics_is_repeatable() {
        ensure_metrics_init();
        register_sync_metrics();
        register_sync_metrics();
    }
}
