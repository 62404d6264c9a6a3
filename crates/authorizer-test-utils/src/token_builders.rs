//! Claims and token builders.
//!
//! [`TokenClaimsBuilder`] starts from a token that the harness trust policy
//! accepts and lets a test break exactly one thing about it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};

/// Issuer accepted by the test trust policy.
pub const TEST_ISSUER: &str = "https://idp.example/pool1";

/// Audience / client id accepted by the test trust policy.
pub const TEST_CLIENT_ID: &str = "client123";

/// Expected `token_use`.
pub const TEST_TOKEN_USE: &str = "access";

/// Lifetime given to tokens built by [`TokenClaimsBuilder::valid`].
pub const TEST_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Builder for token payloads.
#[derive(Debug, Clone)]
pub struct TokenClaimsBuilder {
    claims: Map<String, Value>,
}

impl TokenClaimsBuilder {
    /// Claims that pass every check at `now`.
    pub fn valid_at(sub: &str, now: i64) -> Self {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::from(sub));
        claims.insert("iss".to_string(), Value::from(TEST_ISSUER));
        claims.insert("aud".to_string(), Value::from(TEST_CLIENT_ID));
        claims.insert("token_use".to_string(), Value::from(TEST_TOKEN_USE));
        claims.insert("iat".to_string(), Value::from(now));
        claims.insert(
            "exp".to_string(),
            Value::from(now + TEST_TOKEN_LIFETIME_SECS),
        );
        Self { claims }
    }

    /// Claims that pass every check at the current wall-clock time.
    pub fn valid(sub: &str) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs() as i64;
        Self::valid_at(sub, now)
    }

    pub fn issuer(self, iss: &str) -> Self {
        self.claim("iss", iss)
    }

    pub fn audience(self, aud: &str) -> Self {
        self.claim("aud", aud)
    }

    pub fn audiences(self, auds: &[&str]) -> Self {
        self.claim("aud", auds.to_vec())
    }

    pub fn client_id(self, client_id: &str) -> Self {
        self.claim("client_id", client_id)
    }

    pub fn token_use(self, token_use: &str) -> Self {
        self.claim("token_use", token_use)
    }

    pub fn expires_at(self, exp: i64) -> Self {
        self.claim("exp", exp)
    }

    pub fn issued_at(self, iat: i64) -> Self {
        self.claim("iat", iat)
    }

    pub fn not_before(self, nbf: i64) -> Self {
        self.claim("nbf", nbf)
    }

    pub fn username(self, username: &str) -> Self {
        self.claim("username", username)
    }

    pub fn scope(self, scope: &str) -> Self {
        self.claim("scope", scope)
    }

    pub fn auth_time(self, auth_time: i64) -> Self {
        self.claim("auth_time", auth_time)
    }

    /// Set an arbitrary claim.
    pub fn claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    /// Remove a claim.
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

/// Assemble a token from raw parts without signing it.
///
/// Used for tokens a real signer would refuse to produce (`alg: none`,
/// symmetric algorithms, garbage signatures).
pub fn forge_token(header: &Value, claims: &Value, signature: &[u8]) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode(signature)
    )
}
