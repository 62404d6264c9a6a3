//! Metrics definitions for the authorizer.
//!
//! All metrics follow Prometheus naming conventions:
//! - `authz_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `outcome`: 3 values (allow, unauthorized, service_error)
//! - `reason`: the fixed `AuthError::reason()` labels plus `ok`
//! - `status`: success/error (JWKS) or success/error/timeout (HTTP)
//! - `endpoint`: the service's fixed routes plus `other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Decisions are CPU-bound on a warm cache; refreshes dominate the tail
        .set_buckets_for_metric(
            Matcher::Prefix("authz_decision".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
                5.000,
            ],
        )
        .map_err(|e| format!("Failed to set decision buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("authz_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("authz_http_request".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Decision Metrics
// ============================================================================

/// Record one authorization decision.
///
/// Metric: `authz_decisions_total`, `authz_decision_duration_seconds`
/// Labels: `outcome`, `reason`
pub fn record_decision(outcome: &'static str, reason: &'static str, duration: Duration) {
    histogram!("authz_decision_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());

    counter!("authz_decisions_total", "outcome" => outcome, "reason" => reason).increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a key set refresh attempt.
///
/// Metric: `authz_jwks_refresh_total`, `authz_jwks_refresh_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("authz_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("authz_jwks_refresh_total", "status" => status).increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `authz_http_requests_total`, `authz_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
///
/// Captures every response, including framework-level errors such as
/// 400/415 for bad bodies and 404/405 for unknown routes.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("authz_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("authz_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto the fixed route set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/authorize" => "/authorize",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "other",
    }
}
