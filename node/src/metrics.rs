//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped from the `/metrics` endpoint
//! on the metrics port. Registered in a dedicated registry so nothing
//! collides with default-registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Registry that owns all metrics below.
    registry: Registry,
    /// Current chain height.
    pub chain_height: IntGauge,
    /// Number of currently connected peers.
    pub connected_peers: IntGauge,
    /// Number of peers ever heard of.
    pub known_peers: IntGauge,
    /// Total notarizations accepted through the HTTP API.
    pub uploads_total: IntCounter,
    /// Total HTTP upload requests rejected or failed.
    pub upload_failures_total: IntCounter,
}

/// Shared handle passed to request handlers and background tasks.
pub type SharedMetrics = Arc<NodeMetrics>;

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("selo".into()), None)
            .expect("failed to create prometheus registry");

        let chain_height =
            IntGauge::new("chain_height", "Current chain height").expect("metric creation");
        registry
            .register(Box::new(chain_height.clone()))
            .expect("metric registration");

        let connected_peers =
            IntGauge::new("connected_peers", "Number of currently connected peers")
                .expect("metric creation");
        registry
            .register(Box::new(connected_peers.clone()))
            .expect("metric registration");

        let known_peers =
            IntGauge::new("known_peers", "Number of peers ever heard of")
                .expect("metric creation");
        registry
            .register(Box::new(known_peers.clone()))
            .expect("metric registration");

        let uploads_total = IntCounter::new(
            "uploads_total",
            "Total notarizations accepted through the HTTP API",
        )
        .expect("metric creation");
        registry
            .register(Box::new(uploads_total.clone()))
            .expect("metric registration");

        let upload_failures_total = IntCounter::new(
            "upload_failures_total",
            "Total HTTP upload requests rejected or failed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(upload_failures_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            chain_height,
            connected_peers,
            known_peers,
            uploads_total,
            upload_failures_total,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders the registry in the Prometheus text exposition format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = metrics.registry.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics".to_string(),
        );
    }
    (
        StatusCode::OK,
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_update() {
        let metrics = NodeMetrics::new();
        metrics.chain_height.set(5);
        metrics.uploads_total.inc();
        metrics.uploads_total.inc();

        let families = metrics.registry.gather();
        assert!(!families.is_empty());

        let uploads = families
            .iter()
            .find(|f| f.get_name() == "selo_uploads_total")
            .expect("uploads metric present");
        assert_eq!(uploads.get_metric()[0].get_counter().get_value(), 2.0);
    }
}
