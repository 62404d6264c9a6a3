//! Utilities shared by the request authorizer crates.

#![warn(clippy::pedantic)]

/// Module for shared configuration types
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (header parsing, time claims, constants)
pub mod jwt;
