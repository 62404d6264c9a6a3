//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! This endpoint is unauthenticated so Prometheus can scrape it. Labels are
//! bounded and carry no principal identifiers or tokens.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE authz_decisions_total counter
/// authz_decisions_total{outcome="allow",reason="ok"} 42
/// ```
#[tracing::instrument(skip_all, name = "authz.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
