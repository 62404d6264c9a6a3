//! Request Authorizer
//!
//! HTTP service invoked by the API gateway to authorize bearer tokens.

use authorizer::auth::{HttpKeySetFetcher, SystemClock};
use authorizer::config::Config;
use authorizer::observability::metrics::init_metrics_recorder;
use authorizer::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first; tracing setup depends on it
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config);

    info!("Starting request authorizer");
    info!(
        issuer = %config.issuer,
        audiences = ?config.audiences,
        token_use = %config.token_use,
        allowed_algorithms = ?config.allowed_algorithms,
        jwks_url = %config.jwks_url,
        jwks_cache_ttl_seconds = config.jwks_cache_ttl.as_secs(),
        bind_address = %config.bind_address,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let fetcher = Arc::new(HttpKeySetFetcher::new(
        config.jwks_url.clone(),
        config.jwks_fetch_timeout,
    ));
    let bind_address = config.bind_address.clone();
    let drain_period = config.drain_period;
    let state = Arc::new(AppState::new(config, fetcher, Arc::new(SystemClock)));

    // A cold cache is legal; the first invocation will fetch
    match state.key_cache.prefetch().await {
        Ok(key_count) => info!(key_count, "JWKS prefetched"),
        Err(e) => warn!(error = %e, "JWKS prefetch failed, starting with cold cache"),
    }

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Request authorizer listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_period))
        .await?;

    info!("Request authorizer shutdown complete");

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_filter.clone().into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_period: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (AUTHORIZER_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}
