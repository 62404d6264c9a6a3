//! Key material cache for the identity provider's signing keys.
//!
//! The provider publishes its public keys as a JWKS document (usually at
//! `{issuer}/.well-known/jwks.json`). [`KeyCache`] holds the parsed key set,
//! keyed by `kid`, and refreshes it when:
//! - the cache is cold,
//! - the cached set is older than the configured TTL, or
//! - a token names a `kid` the cached set does not contain (key rotation).
//!
//! # Concurrency
//!
//! - The key set is replaced wholesale behind an `RwLock`; readers see either
//!   the old or the new set, never a mix.
//! - Refreshes are single-flight: callers that need a refresh queue on one
//!   mutex, the first performs the fetch, and every caller that was already
//!   waiting receives that fetch's outcome instead of fetching again.
//! - Every fetch is bounded by a timeout so a slow provider cannot stall
//!   invocations indefinitely.

use crate::auth::clock::Clock;
use crate::observability::metrics::record_jwks_refresh;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default key set freshness window (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default upper bound on a single key set fetch (5 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - matched against the token header's `kid`.
    pub kid: String,

    /// Algorithm the key is meant for (e.g. "RS256").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (must be "sig" when present).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// OKP curve name ("Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

/// Key cache failures.
///
/// `Fetch` is infrastructural and retryable; `UnknownSigningKey` is a terminal
/// decision about one token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyCacheError {
    #[error("signing key not found in key set")]
    UnknownSigningKey,

    #[error("key set fetch failed: {0}")]
    Fetch(String),
}

/// Reasons a published JWK cannot be used for verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JwkError {
    #[error("unsupported key use: {0}")]
    UnsupportedUse(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("missing key component: {0}")]
    MissingComponent(&'static str),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// A verification key ready for signature checks.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    kty: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("kty", &self.kty)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Build a verification key from a published JWK.
    ///
    /// # Errors
    ///
    /// Returns `JwkError` if the key is not a signing key, names an unknown
    /// algorithm, has an unsupported type, or lacks key material.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JwkError> {
        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(JwkError::UnsupportedUse(key_use.to_string()));
            }
        }

        let algorithm = jwk
            .alg
            .as_deref()
            .map(|alg| {
                Algorithm::from_str(alg).map_err(|_| JwkError::UnsupportedAlgorithm(alg.to_string()))
            })
            .transpose()?;

        let decoding_key = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or(JwkError::MissingComponent("n"))?;
                let e = jwk.e.as_deref().ok_or(JwkError::MissingComponent("e"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| JwkError::InvalidKey(e.to_string()))?
            }
            "OKP" => {
                if let Some(crv) = jwk.crv.as_deref() {
                    if crv != "Ed25519" {
                        return Err(JwkError::UnsupportedKeyType(format!("OKP/{crv}")));
                    }
                }
                let x = jwk.x.as_deref().ok_or(JwkError::MissingComponent("x"))?;
                DecodingKey::from_ed_components(x)
                    .map_err(|e| JwkError::InvalidKey(e.to_string()))?
            }
            other => return Err(JwkError::UnsupportedKeyType(other.to_string())),
        };

        Ok(Self {
            kid: jwk.kid.clone(),
            kty: jwk.kty.clone(),
            algorithm,
            decoding_key,
        })
    }

    /// Key ID.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// JWK key type.
    pub fn key_type(&self) -> &str {
        &self.kty
    }

    /// Algorithm pinned by the JWK, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Immutable snapshot of the provider's usable signing keys, ordered by `kid`.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: BTreeMap<String, Arc<SigningKey>>,
}

impl SigningKeySet {
    /// Convert a JWKS document, skipping keys that cannot verify signatures.
    pub fn from_jwks(jwks: JwksResponse) -> Self {
        let mut keys = BTreeMap::new();

        for jwk in jwks.keys {
            match SigningKey::from_jwk(&jwk) {
                Ok(key) => {
                    if keys.contains_key(&jwk.kid) {
                        tracing::warn!(target: "authz.jwks", kid = %jwk.kid, "Duplicate kid in JWKS, keeping first");
                        continue;
                    }
                    keys.insert(jwk.kid.clone(), Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(target: "authz.jwks", kid = %jwk.kid, error = %e, "Skipping unusable JWK");
                }
            }
        }

        Self { keys }
    }

    /// Look up a key by `kid`.
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no usable keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// Source of the provider's JWKS document.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch the full key set.
    async fn fetch(&self) -> Result<JwksResponse, KeyCacheError>;
}

/// Fetches the JWKS document over HTTP.
pub struct HttpKeySetFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `jwks_url` whose requests time out after `timeout`.
    pub fn new(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "authz.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    /// The JWKS endpoint this fetcher reads.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<JwksResponse, KeyCacheError> {
        tracing::debug!(target: "authz.jwks", "Fetching JWKS from identity provider");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "authz.jwks", error = %e, "Failed to fetch JWKS");
                KeyCacheError::Fetch(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "authz.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeyCacheError::Fetch(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        response.json::<JwksResponse>().await.map_err(|e| {
            tracing::error!(target: "authz.jwks", error = %e, "Failed to parse JWKS response");
            KeyCacheError::Fetch(format!("invalid JWKS document: {e}"))
        })
    }
}

/// Cached key set with expiry time.
struct CachedKeySet {
    keys: SigningKeySet,

    /// Unix seconds after which the set is stale.
    expires_at: i64,
}

impl CachedKeySet {
    fn is_fresh(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

type RefreshOutcome = Result<Arc<CachedKeySet>, KeyCacheError>;

/// Shared cache of the provider's signing keys.
pub struct KeyCache {
    fetcher: Arc<dyn KeySetFetcher>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    fetch_timeout: Duration,

    /// Current key set, replaced wholesale on refresh.
    cache: RwLock<Option<Arc<CachedKeySet>>>,

    /// Single-flight gate; holds the outcome of the most recent refresh.
    flight: Mutex<Option<RefreshOutcome>>,

    /// Completed refresh attempts (success or failure).
    completed_refreshes: AtomicU64,
}

impl KeyCache {
    /// Create a cache with the default TTL and fetch timeout.
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(fetcher, clock, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a cache with a custom TTL and fetch timeout.
    pub fn with_settings(
        fetcher: Arc<dyn KeySetFetcher>,
        clock: Arc<dyn Clock>,
        cache_ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            clock,
            cache_ttl,
            fetch_timeout,
            cache: RwLock::new(None),
            flight: Mutex::new(None),
            completed_refreshes: AtomicU64::new(0),
        }
    }

    /// Resolve a key by `kid`, refreshing the key set when needed.
    ///
    /// A fresh cache that contains `kid` answers without I/O. A cold or stale
    /// cache, or a fresh cache missing `kid`, triggers exactly one refresh
    /// before the lookup is retried.
    ///
    /// # Errors
    ///
    /// - `KeyCacheError::Fetch` if the refresh fails or times out
    /// - `KeyCacheError::UnknownSigningKey` if `kid` is absent after the refresh
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyCacheError> {
        // Read the attempt counter before the snapshot so a refresh finishing
        // in between is recognised as newer than what we saw.
        let observed = self.completed_refreshes.load(Ordering::Acquire);

        let snapshot = self.cache.read().await.clone();
        if let Some(cached) = snapshot {
            if cached.is_fresh(self.clock.now_unix()) {
                if let Some(key) = cached.keys.get(kid) {
                    tracing::debug!(target: "authz.jwks", "JWKS cache hit");
                    return Ok(key);
                }
                tracing::debug!(target: "authz.jwks", "Key not found in JWKS cache, forcing refresh");
            } else {
                tracing::debug!(target: "authz.jwks", "JWKS cache expired");
            }
        }

        let refreshed = self.refresh_after(observed).await?;

        refreshed.keys.get(kid).ok_or_else(|| {
            tracing::warn!(target: "authz.jwks", "Key not found in JWKS after refresh");
            KeyCacheError::UnknownSigningKey
        })
    }

    /// Refresh the key set now and return the number of usable keys.
    ///
    /// Used to warm the cache at startup and by the readiness probe.
    ///
    /// # Errors
    ///
    /// Returns `KeyCacheError::Fetch` if the refresh fails.
    pub async fn prefetch(&self) -> Result<usize, KeyCacheError> {
        let observed = self.completed_refreshes.load(Ordering::Acquire);
        let refreshed = self.refresh_after(observed).await?;
        Ok(refreshed.keys.len())
    }

    /// Whether a key set is cached and within its freshness window.
    pub async fn is_fresh(&self) -> bool {
        let now = self.clock.now_unix();
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(|cached| cached.is_fresh(now))
    }

    /// Number of refresh attempts completed so far.
    pub fn refresh_count(&self) -> u64 {
        self.completed_refreshes.load(Ordering::Acquire)
    }

    /// Refresh unless another refresh completed since `observed`.
    async fn refresh_after(&self, observed: u64) -> RefreshOutcome {
        let mut last_outcome = self.flight.lock().await;

        if self.completed_refreshes.load(Ordering::Acquire) != observed {
            if let Some(outcome) = last_outcome.as_ref() {
                tracing::debug!(target: "authz.jwks", "Reusing result of concurrent JWKS refresh");
                return outcome.clone();
            }
        }

        let outcome = self.fetch_key_set().await;

        if let Ok(fresh) = &outcome {
            let mut cache = self.cache.write().await;
            *cache = Some(Arc::clone(fresh));
        }

        *last_outcome = Some(outcome.clone());
        self.completed_refreshes.fetch_add(1, Ordering::AcqRel);

        outcome
    }

    async fn fetch_key_set(&self) -> RefreshOutcome {
        let start = Instant::now();

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    target: "authz.jwks",
                    timeout_ms = u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
                    "JWKS fetch timed out"
                );
                Err(KeyCacheError::Fetch("timed out".to_string()))
            }
        };

        let outcome = fetched.and_then(|jwks| {
            let keys = SigningKeySet::from_jwks(jwks);
            if keys.is_empty() {
                tracing::error!(target: "authz.jwks", "JWKS contains no usable signing keys");
                return Err(KeyCacheError::Fetch(
                    "key set contains no usable signing keys".to_string(),
                ));
            }

            let ttl_secs = i64::try_from(self.cache_ttl.as_secs()).unwrap_or(i64::MAX);
            Ok(Arc::new(CachedKeySet {
                keys,
                expires_at: self.clock.now_unix().saturating_add(ttl_secs),
            }))
        });

        match &outcome {
            Ok(cached) => {
                tracing::info!(
                    target: "authz.jwks",
                    key_count = cached.keys.len(),
                    "JWKS cache refreshed"
                );
                record_jwks_refresh("success", start.elapsed());
            }
            Err(_) => record_jwks_refresh("error", start.elapsed()),
        }

        outcome
    }
}
