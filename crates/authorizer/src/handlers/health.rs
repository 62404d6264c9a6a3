//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks that signing keys can be resolved

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does NOT check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Ready when the key cache holds a fresh key set, or a refresh succeeds now.
/// Returns 200 if ready, 503 if not.
///
/// ## Security
///
/// The response body is generic; the refresh error is logged server-side.
#[tracing::instrument(skip_all, name = "authz.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.key_cache.is_fresh().await {
        return ready();
    }

    match state.key_cache.prefetch().await {
        Ok(_) => ready(),
        Err(e) => {
            tracing::warn!(target: "authz.jwks", error = %e, "Readiness check failed: JWKS unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    jwks: "unavailable",
                    error: Some("Service dependencies unavailable"),
                }),
            )
        }
    }
}

fn ready() -> (StatusCode, Json<ReadinessResponse>) {
    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            jwks: "available",
            error: None,
        }),
    )
}
