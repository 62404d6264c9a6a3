//! Request authorizer library.
//!
//! Decides, per gateway invocation, whether a bearer token is valid and
//! produces the access decision the gateway enforces.
//!
//! Control flow: [`authorizer::Authorizer`] extracts the token
//! ([`auth::extract`]), verifies it ([`auth::jwt`]) against keys from the
//! shared cache ([`auth::jwks`]), and builds the decision ([`policy`]).

pub mod auth;
pub mod authorizer;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod policy;
pub mod routes;

#[cfg(test)]
mod test_support;
