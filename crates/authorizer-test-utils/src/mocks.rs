//! Mock implementations of the authorizer's injected seams.

use async_trait::async_trait;
use authorizer::auth::clock::Clock;
use authorizer::auth::jwks::{JwksResponse, KeyCacheError, KeySetFetcher};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Key set fetcher that serves a configurable JWKS document and counts calls.
pub struct MockKeySetFetcher {
    response: Mutex<Result<serde_json::Value, String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockKeySetFetcher {
    /// Serve `jwks` (a `{"keys": [...]}` document).
    pub fn serving(jwks: serde_json::Value) -> Self {
        Self {
            response: Mutex::new(Ok(jwks)),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every fetch with `detail`.
    pub fn failing(detail: &str) -> Self {
        Self {
            response: Mutex::new(Err(detail.to_string())),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    /// Replace the served document.
    pub fn set_jwks(&self, jwks: serde_json::Value) {
        *self.response.lock().unwrap() = Ok(jwks);
    }

    /// Start failing.
    pub fn set_failure(&self, detail: &str) {
        *self.response.lock().unwrap() = Err(detail.to_string());
    }

    /// Number of fetches started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for MockKeySetFetcher {
    async fn fetch(&self) -> Result<JwksResponse, KeyCacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let response = self.response.lock().unwrap().clone();
        match response {
            Ok(jwks) => serde_json::from_value(jwks).map_err(|e| KeyCacheError::Fetch(e.to_string())),
            Err(detail) => Err(KeyCacheError::Fetch(detail)),
        }
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn at(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
