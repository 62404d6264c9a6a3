//! Bearer token verification.
//!
//! Validates tokens against the identity provider's published keys and the
//! configured [`TrustPolicy`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - The header `alg` must be on the allow list; it is checked before any key
//!   lookup so an attacker-chosen algorithm never reaches the key cache
//! - The resolved key's family (and its JWK `alg`, when published) must match
//!   the declared algorithm
//! - `exp` is required and has no leeway; `nbf`/`iat` allow the configured skew
//! - Every failure is a distinct [`AuthError`]; the caller only ever sees the
//!   coarse rejection kind

use crate::auth::claims::{Audience, TokenClaims, VerifiedClaims};
use crate::auth::clock::Clock;
use crate::auth::jwks::{KeyCache, SigningKey};
use crate::errors::AuthError;
use async_trait::async_trait;
use common::jwt::{parse_header, validate_exp_at, validate_iat_at, validate_nbf_at};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Trust parameters a token must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Exact expected `iss`.
    pub issuer: String,

    /// Accepted `aud` values, also matched against `client_id` when `aud` is absent.
    pub audiences: Vec<String>,

    /// Expected `token_use`.
    pub token_use: String,

    /// Signing algorithms a token header may declare.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Tolerance for `nbf` and `iat` in the future.
    pub clock_skew: Duration,
}

impl TrustPolicy {
    fn accepts_audience(&self, candidate: &str) -> bool {
        self.audiences.iter().any(|aud| aud == candidate)
    }
}

/// Anything that can turn a bearer token into verified claims.
///
/// The entry point depends on this trait rather than on [`TokenVerifier`]
/// directly so it can be exercised with a mock.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Verify `token` and return its claims.
    async fn validate(&self, token: &str) -> Result<VerifiedClaims, AuthError>;
}

/// Verifies tokens against keys from a shared [`KeyCache`].
pub struct TokenVerifier {
    policy: TrustPolicy,
    key_cache: Arc<KeyCache>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Create a verifier.
    ///
    /// # Arguments
    ///
    /// * `policy` - Trust parameters every token must satisfy
    /// * `key_cache` - Shared cache of the provider's signing keys
    /// * `clock` - Time source for `exp`/`nbf`/`iat` checks
    pub fn new(policy: TrustPolicy, key_cache: Arc<KeyCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            key_cache,
            clock,
        }
    }

    /// Trust parameters in force.
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Verify a token.
    ///
    /// # Checks (first failure wins)
    ///
    /// 1. Size and header decode, then `alg` against the allow list
    /// 2. Key resolution through the key cache
    /// 3. Signature with the declared algorithm and resolved key
    /// 4. `exp`, then `nbf`/`iat` with clock skew
    /// 5. `iss`
    /// 6. `aud` (or `client_id` when `aud` is absent)
    /// 7. `token_use`
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing check.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        // 1. Header (includes size check via common::jwt)
        let header = parse_header(token).map_err(|e| {
            tracing::debug!(target: "authz.jwt", error = ?e, "Token header rejected");
            AuthError::MalformedToken
        })?;
        let algorithm = self.allowed_algorithm(&header.alg)?;

        // 2. Key
        let key = self.key_cache.resolve(&header.kid).await?;

        // 3. Signature
        let claims = verify_signature(token, &key, algorithm)?;

        // 4-7. Claims
        self.check_times(&claims)?;
        self.check_issuer(&claims)?;
        self.check_audience(&claims)?;
        self.check_token_use(&claims)?;

        tracing::debug!(target: "authz.jwt", kid = %header.kid, "Token verified");
        Ok(VerifiedClaims::from_checked(
            claims,
            self.policy.issuer.clone(),
            self.policy.token_use.clone(),
        ))
    }

    fn allowed_algorithm(&self, alg: &str) -> Result<Algorithm, AuthError> {
        match Algorithm::from_str(alg) {
            Ok(algorithm) if self.policy.allowed_algorithms.contains(&algorithm) => Ok(algorithm),
            _ => {
                tracing::warn!(target: "authz.jwt", alg = %alg, "Token declares a disallowed algorithm");
                Err(AuthError::SignatureInvalid)
            }
        }
    }

    fn check_times(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        let now = self.clock.now_unix();
        let skew = self.policy.clock_skew;

        let result = validate_exp_at(claims.exp, now)
            .and_then(|()| claims.nbf.map_or(Ok(()), |nbf| validate_nbf_at(nbf, skew, now)))
            .and_then(|()| claims.iat.map_or(Ok(()), |iat| validate_iat_at(iat, skew, now)));

        result.map_err(|e| {
            tracing::debug!(target: "authz.jwt", error = ?e, "Token time claims rejected");
            AuthError::TokenExpired
        })
    }

    fn check_issuer(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        if claims.iss.as_deref() == Some(self.policy.issuer.as_str()) {
            return Ok(());
        }
        tracing::debug!(target: "authz.jwt", iss = ?claims.iss, "Token issuer mismatch");
        Err(AuthError::IssuerMismatch)
    }

    fn check_audience(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        let accepted = match &claims.aud {
            Some(Audience::One(aud)) => self.policy.accepts_audience(aud),
            Some(Audience::Many(auds)) => auds.iter().any(|aud| self.policy.accepts_audience(aud)),
            None => claims
                .client_id
                .as_deref()
                .is_some_and(|client_id| self.policy.accepts_audience(client_id)),
        };

        if accepted {
            return Ok(());
        }
        tracing::debug!(
            target: "authz.jwt",
            aud = ?claims.aud,
            client_id = ?claims.client_id,
            "Token audience mismatch"
        );
        Err(AuthError::AudienceMismatch)
    }

    fn check_token_use(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        if claims.token_use.as_deref() == Some(self.policy.token_use.as_str()) {
            return Ok(());
        }
        tracing::debug!(target: "authz.jwt", token_use = ?claims.token_use, "Token use mismatch");
        Err(AuthError::TokenUseMismatch)
    }
}

#[async_trait]
impl TokenValidator for TokenVerifier {
    async fn validate(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        self.verify(token).await
    }
}

/// Verify the signature and decode the payload.
///
/// Only the cryptographic check runs here; every claim check is done by the
/// caller against an explicit clock.
fn verify_signature(
    token: &str,
    key: &SigningKey,
    algorithm: Algorithm,
) -> Result<TokenClaims, AuthError> {
    if let Some(key_alg) = key.algorithm() {
        if key_alg != algorithm {
            tracing::warn!(
                target: "authz.jwt",
                kid = %key.kid(),
                key_alg = ?key_alg,
                token_alg = ?algorithm,
                "Token algorithm does not match key"
            );
            return Err(AuthError::SignatureInvalid);
        }
    }

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, key.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(target: "authz.jwt", error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::InvalidToken => AuthError::MalformedToken,
                _ => AuthError::SignatureInvalid,
            }
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::KeySetFetcher;
    use crate::test_support::{jwk_from_json, FakeFetcher, FixedClock};
    use authorizer_test_utils::{forge_token, TestKeypair, TokenClaimsBuilder, TEST_CLIENT_ID, TEST_ISSUER};
    use common::jwt::MAX_JWT_SIZE_BYTES;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        keypair: TestKeypair,
        fetcher: Arc<FakeFetcher>,
        clock: Arc<FixedClock>,
        verifier: TokenVerifier,
    }

    fn policy() -> TrustPolicy {
        TrustPolicy {
            issuer: TEST_ISSUER.to_string(),
            audiences: vec![TEST_CLIENT_ID.to_string()],
            token_use: "access".to_string(),
            allowed_algorithms: vec![Algorithm::EdDSA],
            clock_skew: Duration::from_secs(300),
        }
    }

    fn fixture_with(policy: TrustPolicy) -> Fixture {
        let keypair = TestKeypair::new(1, "k1");
        let fetcher = Arc::new(FakeFetcher::serving(vec![jwk_from_json(keypair.jwk_json())]));
        let clock = Arc::new(FixedClock::at(NOW));
        let key_cache = Arc::new(KeyCache::new(
            Arc::clone(&fetcher) as Arc<dyn KeySetFetcher>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let verifier = TokenVerifier::new(policy, key_cache, Arc::clone(&clock) as Arc<dyn Clock>);

        Fixture {
            keypair,
            fetcher,
            clock,
            verifier,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(policy())
    }

    fn claims() -> TokenClaimsBuilder {
        TokenClaimsBuilder::valid_at("user-1", NOW)
    }

    // =========================================================================
    // Success
    // =========================================================================

    #[tokio::test]
    async fn test_valid_token_verifies() {
        let f = fixture();
        let token = f.keypair.sign(&claims().username("alice").scope("read write").build());

        let verified = f.verifier.verify(&token).await.unwrap();

        assert_eq!(verified.subject(), "user-1");
        assert_eq!(verified.issuer(), TEST_ISSUER);
        assert_eq!(verified.token_use(), "access");
        assert_eq!(verified.username(), Some("alice"));
        assert_eq!(verified.expires_at(), NOW + 3600);
        assert_eq!(f.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_fractional_expiry_verifies() {
        let f = fixture();
        let token = f.keypair.sign(&claims().claim("exp", (NOW + 60) as f64 + 0.5).build());

        let verified = f.verifier.verify(&token).await.unwrap();

        assert_eq!(verified.expires_at(), NOW + 60);
    }

    #[tokio::test]
    async fn test_validator_trait_delegates_to_verify() {
        let f = fixture();
        let token = f.keypair.sign(&claims().build());
        let validator: &dyn TokenValidator = &f.verifier;

        assert_eq!(validator.validate(&token).await.unwrap().subject(), "user-1");
    }

    #[tokio::test]
    async fn test_client_id_accepted_when_aud_absent() {
        let f = fixture();
        let token = f
            .keypair
            .sign(&claims().without("aud").client_id(TEST_CLIENT_ID).build());

        let verified = f.verifier.verify(&token).await.unwrap();
        assert_eq!(verified.client_id(), Some(TEST_CLIENT_ID));
        assert!(verified.audience().is_empty());
    }

    #[tokio::test]
    async fn test_audience_array_with_one_accepted_value() {
        let f = fixture();
        let token = f
            .keypair
            .sign(&claims().audiences(&["other", TEST_CLIENT_ID]).build());

        assert!(f.verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_key_without_published_alg_is_usable() {
        let f = fixture();
        f.fetcher
            .set_keys(vec![jwk_from_json(f.keypair.bare_jwk_json())]);
        let token = f.keypair.sign(&claims().build());

        assert!(f.verifier.verify(&token).await.is_ok());
    }

    // =========================================================================
    // Header and signature
    // =========================================================================

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let f = fixture();

        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.payload.sig"] {
            assert_eq!(
                f.verifier.verify(token).await.unwrap_err(),
                AuthError::MalformedToken,
                "{token:?}"
            );
        }
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_token_is_malformed() {
        let f = fixture();
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::MalformedToken);
    }

    #[tokio::test]
    async fn test_missing_kid_is_malformed() {
        let f = fixture();
        let token = forge_token(&serde_json::json!({"alg": "EdDSA"}), &claims().build(), b"sig");

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::MalformedToken);
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_object_header_is_malformed_without_fetch() {
        let f = fixture();

        for header in [
            serde_json::json!(["EdDSA", "never-published"]),
            serde_json::json!("EdDSA"),
            serde_json::json!(null),
        ] {
            let token = forge_token(&header, &claims().build(), b"sig");
            assert_eq!(
                f.verifier.verify(&token).await.unwrap_err(),
                AuthError::MalformedToken,
                "{header}"
            );
        }
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_disallowed_algorithm_rejected_before_key_fetch() {
        let f = fixture();

        for alg in ["none", "HS256", "RS256", "nonsense"] {
            let token = forge_token(
                &serde_json::json!({"alg": alg, "kid": "k1"}),
                &claims().build(),
                b"signature",
            );
            assert_eq!(
                f.verifier.verify(&token).await.unwrap_err(),
                AuthError::SignatureInvalid,
                "{alg}"
            );
        }
        assert_eq!(f.fetcher.calls(), 0, "Disallowed algorithms must not reach the key cache");
    }

    #[tokio::test]
    async fn test_algorithm_not_matching_key_is_signature_invalid() {
        let mut policy = policy();
        policy.allowed_algorithms = vec![Algorithm::EdDSA, Algorithm::RS256];
        let f = fixture_with(policy);
        let token = forge_token(
            &serde_json::json!({"alg": "RS256", "kid": "k1"}),
            &claims().build(),
            b"signature",
        );

        // JWK pins EdDSA
        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::SignatureInvalid);

        // JWK without alg: key family (OKP) still disagrees with RS256
        f.fetcher
            .set_keys(vec![jwk_from_json(f.keypair.bare_jwk_json())]);
        f.clock.advance(7200);
        let token = forge_token(
            &serde_json::json!({"alg": "RS256", "kid": "k1"}),
            &TokenClaimsBuilder::valid_at("user-1", NOW + 7200).build(),
            b"signature",
        );
        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::SignatureInvalid);
    }

    #[tokio::test]
    async fn test_wrong_key_signature_is_invalid() {
        let f = fixture();
        let impostor = TestKeypair::new(2, "k1");
        let token = impostor.sign(&claims().build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::SignatureInvalid);
    }

    #[tokio::test]
    async fn test_tampered_payload_is_signature_invalid() {
        let f = fixture();
        let token = f.keypair.sign(&claims().build());
        let parts: Vec<&str> = token.split('.').collect();
        let tampered_payload = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            claims().claim("sub", "admin").build().to_string(),
        );
        let tampered = format!("{}.{}.{}", parts[0], tampered_payload, parts[2]);

        assert_eq!(f.verifier.verify(&tampered).await.unwrap_err(), AuthError::SignatureInvalid);
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let f = fixture();
        let stranger = TestKeypair::new(3, "never-published");
        let token = stranger.sign(&claims().build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::UnknownSigningKey);
        assert_eq!(f.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_key_set_fetch() {
        let f = fixture();
        f.fetcher.set_failure("connection refused");
        let token = f.keypair.sign(&claims().build());

        assert!(matches!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::KeySetFetch(_)
        ));
    }

    #[tokio::test]
    async fn test_signed_payload_missing_sub_is_malformed() {
        let f = fixture();
        let token = f.keypair.sign(&claims().without("sub").build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::MalformedToken);
    }

    #[tokio::test]
    async fn test_signed_payload_missing_exp_is_malformed() {
        let f = fixture();
        let token = f.keypair.sign(&claims().without("exp").build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::MalformedToken);
    }

    // =========================================================================
    // Time claims
    // =========================================================================

    #[tokio::test]
    async fn test_expired_token() {
        let f = fixture();
        let token = f.keypair.sign(&claims().expires_at(NOW - 1).build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn test_exp_equal_to_now_is_expired() {
        let f = fixture();
        let token = f.keypair.sign(&claims().expires_at(NOW).build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn test_expiry_wins_over_later_checks() {
        let f = fixture();
        let token = f.keypair.sign(
            &claims()
                .expires_at(NOW - 10)
                .issuer("https://evil.example")
                .audience("client999")
                .token_use("id")
                .build(),
        );

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn test_nbf_and_iat_respect_clock_skew() {
        let f = fixture();

        let within = f
            .keypair
            .sign(&claims().not_before(NOW + 300).issued_at(NOW + 300).build());
        assert!(f.verifier.verify(&within).await.is_ok());

        let future_nbf = f.keypair.sign(&claims().not_before(NOW + 301).build());
        assert_eq!(f.verifier.verify(&future_nbf).await.unwrap_err(), AuthError::TokenExpired);

        let future_iat = f.keypair.sign(&claims().issued_at(NOW + 301).build());
        assert_eq!(f.verifier.verify(&future_iat).await.unwrap_err(), AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn test_token_expires_as_clock_advances() {
        let f = fixture();
        let token = f.keypair.sign(&claims().build());

        assert!(f.verifier.verify(&token).await.is_ok());
        f.clock.advance(3600);
        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::TokenExpired);
    }

    // =========================================================================
    // Issuer, audience, token use
    // =========================================================================

    #[tokio::test]
    async fn test_issuer_must_match_exactly() {
        let f = fixture();

        for iss in ["https://idp.example/pool2", "https://idp.example/pool1/", "HTTPS://IDP.EXAMPLE/POOL1"] {
            let token = f.keypair.sign(&claims().issuer(iss).build());
            assert_eq!(
                f.verifier.verify(&token).await.unwrap_err(),
                AuthError::IssuerMismatch,
                "{iss}"
            );
        }

        let token = f.keypair.sign(&claims().without("iss").build());
        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::IssuerMismatch);
    }

    #[tokio::test]
    async fn test_audience_mismatch() {
        let f = fixture();
        let token = f.keypair.sign(&claims().audience("client999").build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::AudienceMismatch);
    }

    #[tokio::test]
    async fn test_aud_takes_precedence_over_client_id() {
        let f = fixture();
        let token = f
            .keypair
            .sign(&claims().audience("client999").client_id(TEST_CLIENT_ID).build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::AudienceMismatch);
    }

    #[tokio::test]
    async fn test_missing_aud_and_client_id() {
        let f = fixture();
        let token = f.keypair.sign(&claims().without("aud").build());

        assert_eq!(f.verifier.verify(&token).await.unwrap_err(), AuthError::AudienceMismatch);
    }

    #[tokio::test]
    async fn test_token_use_mismatch() {
        let f = fixture();

        let id_token = f.keypair.sign(&claims().token_use("id").build());
        assert_eq!(f.verifier.verify(&id_token).await.unwrap_err(), AuthError::TokenUseMismatch);

        let missing = f.keypair.sign(&claims().without("token_use").build());
        assert_eq!(f.verifier.verify(&missing).await.unwrap_err(), AuthError::TokenUseMismatch);
    }

    #[test]
    fn test_policy_audience_matching() {
        let policy = TrustPolicy {
            audiences: vec!["a".to_string(), "b".to_string()],
            ..policy()
        };
        assert!(policy.accepts_audience("b"));
        assert!(!policy.accepts_audience("c"));
        assert!(!policy.accepts_audience(""));
    }
}
