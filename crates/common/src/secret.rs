//! Secret types for values that must never reach logs.
//!
//! The authorizer receives bearer credentials from untrusted callers. Holding
//! them as [`SecretString`] means any struct deriving `Debug` around them
//! prints `[REDACTED]` instead of the token, so a stray `?request` in a
//! `tracing` call cannot leak a credential.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Invocation {
//!     resource: String,
//!     authorization: SecretString,
//! }
//!
//! let invocation = Invocation {
//!     resource: "arn:aws:execute-api:us-east-1:123:api/prod/GET/collections".to_string(),
//!     authorization: SecretString::from("Bearer eyJ..."),
//! };
//!
//! assert!(!format!("{invocation:?}").contains("eyJ"));
//! assert_eq!(invocation.authorization.expose_secret(), "Bearer eyJ...");
//! ```
//!
//! With the `serde` feature of `secrecy` enabled, secrets deserialize
//! straight from gateway JSON payloads.

pub use secrecy::{ExposeSecret, SecretString};
