//! # Authorizer Test Utilities
//!
//! Shared test utilities for the request authorizer.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys and their JWKs (`crypto_fixtures`)
//! - Claims and token builders, including forged tokens (`token_builders`)
//! - Mock key set fetcher and manual clock (`mocks`)
//! - Server test harness backed by a mock JWKS endpoint (`server_harness`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authorizer_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestAuthorizerServer::spawn().await?;
//!     let token = server.keypair().sign(&TokenClaimsBuilder::valid("user-1").build());
//!
//!     let response = server.authorize(Some(&format!("Bearer {token}"))).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mocks;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mocks::*;
pub use server_harness::*;
pub use token_builders::*;
