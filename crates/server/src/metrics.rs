//! Prometheus metrics
//!
//! Pipeline metrics are emitted through the `metrics` facade by the agent
//! and retrieval crates; this module installs the exporter and serves it.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

/// Install the global Prometheus recorder
///
/// Returns `None` if a recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            metrics::describe_counter!("multi_rag_requests_total", "Queries processed");
            metrics::describe_counter!("multi_rag_rewrites_total", "Successful query rewrites");
            metrics::describe_counter!(
                "multi_rag_strategy_failures_total",
                "Retrieval strategies that failed or timed out"
            );
            metrics::describe_counter!(
                "multi_rag_degraded_total",
                "Requests answered after the deadline expired"
            );
            metrics::describe_histogram!(
                "multi_rag_request_duration_seconds",
                metrics::Unit::Seconds,
                "End-to-end query latency"
            );
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled".to_string()),
    }
}
