//! JWT primitives shared by the authorizer crates.
//!
//! This module covers the parts of token handling that happen *around* the
//! cryptographic check:
//! - Size limits applied before any decoding
//! - Header parsing (`alg` and `kid`) without signature verification
//! - Time-claim checks (`exp`, `nbf`, `iat`) against an explicit `now`
//!
//! Signature verification itself lives in the authorizer's verifier, which
//! resolves the key named by the header through its key cache.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Header values are only used to select a key and an algorithm; the token
//!   MUST still be verified against the resolved key
//! - Error messages are intentionally generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_header, validate_exp_at, validate_iat_at, DEFAULT_CLOCK_SKEW};
//!
//! let header = parse_header(token)?;
//! let key = key_cache.resolve(&header.kid).await?;
//! // ... verify signature ...
//! validate_exp_at(claims.exp, now)?;
//! validate_iat_at(claims.iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Identity-provider access tokens are typically 800-1500 bytes. Anything
/// larger than this is rejected before base64 decoding or signature checks.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance applied to `nbf` and `iat` (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced by header parsing and time-claim checks.
///
/// Display strings are generic on purpose; use the variant for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-part JWT with a decodable JSON header.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Header has no usable `alg`.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,

    /// `exp` is at or before the current time.
    #[error("The access token is invalid or expired")]
    Expired,

    /// `nbf` is later than now plus the clock skew.
    #[error("The access token is invalid or expired")]
    NotYetValid,

    /// `iat` is later than now plus the clock skew.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Header
// =============================================================================

/// The two header fields the verifier needs before it can check a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm, exactly as it appears in the token.
    pub alg: String,

    /// Key identifier used to select a key from the provider's key set.
    pub kid: String,
}

/// Parse the `alg` and `kid` from a JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - The signature is NOT checked here
/// - Empty `kid`/`alg` values are rejected
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong segment count, bad base64url, or header is not a JSON object
/// - `MissingKid` - `kid` absent, empty, or not a string
/// - `MissingAlgorithm` - `alg` absent, empty, or not a string
pub fn parse_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    // Only a JSON object is a header; arrays and scalars are malformed
    let mut header: Map<String, Value> = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = non_empty_string(header.remove("kid")).ok_or(JwtValidationError::MissingKid)?;
    let alg = non_empty_string(header.remove("alg")).ok_or(JwtValidationError::MissingAlgorithm)?;

    Ok(TokenHeader { alg, kid })
}

fn non_empty_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

// =============================================================================
// Time claims
// =============================================================================

/// Reject tokens whose `exp` is at or before `now`.
///
/// No leeway is applied: an access token is dead the second it expires.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp <= now`.
pub fn validate_exp_at(exp: i64, now: i64) -> Result<(), JwtValidationError> {
    if exp <= now {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }
    Ok(())
}

/// Reject tokens whose `nbf` is later than `now + clock_skew`.
///
/// # Errors
///
/// Returns `JwtValidationError::NotYetValid` if the token is not yet usable.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    if nbf > now.saturating_add(skew_secs(clock_skew)) {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            "Token rejected: not yet valid"
        );
        return Err(JwtValidationError::NotYetValid);
    }
    Ok(())
}

/// Reject tokens whose `iat` is later than `now + clock_skew`.
///
/// A future `iat` beyond the tolerated skew points at token pre-generation or
/// a badly drifting issuer clock.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the check fails.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
