//! Token claims.
//!
//! [`TokenClaims`] is the raw payload as decoded from the token. It becomes a
//! [`VerifiedClaims`] only after the verifier has checked the signature and
//! every trust parameter, so holding a `VerifiedClaims` is proof of a fully
//! verified token.
//!
//! `sub` and `username` identify a person and are redacted in Debug output.

use serde::{Deserialize, Deserializer};
use std::fmt;

/// `aud` claim, which may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

/// Raw token payload.
///
/// `sub` and `exp` are mandatory; a token without them does not decode.
#[derive(Clone, Deserialize)]
pub(crate) struct TokenClaims {
    pub sub: String,
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub token_use: Option<String>,
    #[serde(default, alias = "cognito:username")]
    pub username: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "optional_numeric_date")]
    pub auth_time: Option<i64>,
    #[serde(default, deserialize_with = "optional_numeric_date")]
    pub iat: Option<i64>,
    #[serde(default, deserialize_with = "optional_numeric_date")]
    pub nbf: Option<i64>,
}

/// NumericDate: seconds since the epoch, integral or fractional.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumericDate {
    Whole(i64),
    Fractional(f64),
}

impl NumericDate {
    /// Truncate to whole seconds, rounding toward the past.
    fn into_seconds<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            NumericDate::Whole(secs) => Ok(secs),
            NumericDate::Fractional(secs) => {
                let floored = secs.floor();
                // i64::MAX as f64 rounds up to 2^63, which is itself out of range
                if floored.is_finite() && floored >= i64::MIN as f64 && floored < i64::MAX as f64 {
                    Ok(floored as i64)
                } else {
                    Err(E::custom("NumericDate out of range"))
                }
            }
        }
    }
}

fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    NumericDate::deserialize(deserializer)?.into_seconds()
}

fn optional_numeric_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    Option::<NumericDate>::deserialize(deserializer)?
        .map(NumericDate::into_seconds)
        .transpose()
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("client_id", &self.client_id)
            .field("token_use", &self.token_use)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .finish_non_exhaustive()
    }
}

/// Claims of a token that passed every verification step.
///
/// Only the verifier constructs this type.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    subject: String,
    issuer: String,
    audience: Vec<String>,
    client_id: Option<String>,
    token_use: String,
    username: Option<String>,
    scope: Option<String>,
    auth_time: Option<i64>,
    issued_at: Option<i64>,
    expires_at: i64,
}

impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("client_id", &self.client_id)
            .field("token_use", &self.token_use)
            .field("username", &self.username.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .field("auth_time", &self.auth_time)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl VerifiedClaims {
    /// Promote checked raw claims. `issuer` and `token_use` are the values the
    /// verifier matched against its trust policy.
    pub(crate) fn from_checked(claims: TokenClaims, issuer: String, token_use: String) -> Self {
        Self {
            subject: claims.sub,
            issuer,
            audience: claims.aud.map(Audience::into_vec).unwrap_or_default(),
            client_id: claims.client_id,
            token_use,
            username: claims.username,
            scope: claims.scope,
            auth_time: claims.auth_time,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }

    /// Subject (`sub`), the principal identifier.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer (`iss`).
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audience values (`aud`); empty when the token carried none.
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// OAuth client id (`client_id`).
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Token purpose (`token_use`).
    pub fn token_use(&self) -> &str {
        &self.token_use
    }

    /// Username (`username` or `cognito:username`).
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Space-separated scopes (`scope`).
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Get all scopes as a vector.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|scope| scope.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Authentication time (`auth_time`, Unix seconds).
    pub fn auth_time(&self) -> Option<i64> {
        self.auth_time
    }

    /// Issued-at (`iat`, Unix seconds).
    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    /// Expiry (`exp`, Unix seconds).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}
