//! HTTP routes for the authorizer.
//!
//! Defines the Axum router and application state.

use crate::auth::clock::Clock;
use crate::auth::jwks::{KeyCache, KeySetFetcher};
use crate::auth::jwt::{TokenValidator, TokenVerifier};
use crate::authorizer::Authorizer;
use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Signing key cache, shared by every invocation.
    pub key_cache: Arc<KeyCache>,

    /// Entry point for gateway invocations.
    pub authorizer: Arc<Authorizer>,
}

impl AppState {
    /// Wire the key cache, verifier and entry point from `config`.
    pub fn new(config: Config, fetcher: Arc<dyn KeySetFetcher>, clock: Arc<dyn Clock>) -> Self {
        let key_cache = Arc::new(KeyCache::with_settings(
            fetcher,
            Arc::clone(&clock),
            config.jwks_cache_ttl,
            config.jwks_fetch_timeout,
        ));
        let verifier: Arc<dyn TokenValidator> = Arc::new(TokenVerifier::new(
            config.trust_policy(),
            Arc::clone(&key_cache),
            clock,
        ));

        Self {
            config,
            key_cache,
            authorizer: Arc::new(Authorizer::new(verifier)),
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/authorize` - Gateway invocation endpoint
/// - `/health` - Liveness probe (simple "OK")
/// - `/ready` - Readiness probe (signing keys resolvable)
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/authorize", post(handlers::authorize))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
