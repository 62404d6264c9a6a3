//! Token authentication for gateway invocations.
//!
//! - [`extract`]: bearer token extraction from the authorization field
//! - [`jwks`]: signing key cache backed by the provider's JWKS endpoint
//! - [`jwt`]: signature and claim verification
//! - [`claims`]: raw and verified token claims
//! - [`clock`]: injectable time source

pub mod claims;
pub mod clock;
pub mod extract;
pub mod jwks;
pub mod jwt;

pub use claims::VerifiedClaims;
pub use clock::{Clock, SystemClock};
pub use extract::extract_bearer_token;
pub use jwks::{HttpKeySetFetcher, KeyCache, KeyCacheError, KeySetFetcher};
pub use jwt::{TokenValidator, TokenVerifier, TrustPolicy};
