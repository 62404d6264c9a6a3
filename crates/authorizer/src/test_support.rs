//! In-crate fakes for unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::auth::clock::Clock;
use crate::auth::jwks::{Jwk, JwksResponse, KeyCacheError, KeySetFetcher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// RFC 7517 example RSA modulus.
const RSA_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

/// RFC 8037 example Ed25519 public key.
const ED25519_X: &str = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";

pub(crate) fn rsa_jwk(kid: &str) -> Jwk {
    Jwk {
        kty: "RSA".to_string(),
        kid: kid.to_string(),
        alg: Some("RS256".to_string()),
        key_use: Some("sig".to_string()),
        n: Some(RSA_N.to_string()),
        e: Some("AQAB".to_string()),
        crv: None,
        x: None,
    }
}

pub(crate) fn ed25519_jwk(kid: &str) -> Jwk {
    Jwk {
        kty: "OKP".to_string(),
        kid: kid.to_string(),
        alg: Some("EdDSA".to_string()),
        key_use: Some("sig".to_string()),
        n: None,
        e: None,
        crv: Some("Ed25519".to_string()),
        x: Some(ED25519_X.to_string()),
    }
}

pub(crate) fn jwk_from_json(value: serde_json::Value) -> Jwk {
    serde_json::from_value(value).unwrap()
}

/// Key set fetcher with a swappable answer and a call counter.
pub(crate) struct FakeFetcher {
    response: Mutex<Result<Vec<Jwk>, String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub(crate) fn serving(keys: Vec<Jwk>) -> Self {
        Self {
            response: Mutex::new(Ok(keys)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(detail: &str) -> Self {
        Self {
            response: Mutex::new(Err(detail.to_string())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn set_keys(&self, keys: Vec<Jwk>) {
        *self.response.lock().unwrap() = Ok(keys);
    }

    pub(crate) fn set_failure(&self, detail: &str) {
        *self.response.lock().unwrap() = Err(detail.to_string());
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for FakeFetcher {
    async fn fetch(&self) -> Result<JwksResponse, KeyCacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self.response.lock().unwrap().clone();
        response
            .map(|keys| JwksResponse { keys })
            .map_err(KeyCacheError::Fetch)
    }
}

/// Clock pinned to a settable instant.
pub(crate) struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub(crate) fn at(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub(crate) fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
