//! Authorizer error types.
//!
//! Every failure on the authorization path is an [`AuthError`]. Each variant
//! maps to one of two caller-visible outcomes via [`AuthError::rejection_kind`]:
//! - [`RejectionKind::Unauthorized`]: the token was judged and refused (401)
//! - [`RejectionKind::ServiceError`]: the authorizer could not judge (500)
//!
//! The caller never sees which check failed; the specific reason is only
//! logged and recorded in metrics.

use crate::auth::jwks::KeyCacheError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Authorization failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization header is missing or not a bearer credential")]
    MalformedAuthorizationHeader,

    #[error("Token is malformed")]
    MalformedToken,

    #[error("Token signing key is unknown")]
    UnknownSigningKey,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token is expired or not yet valid")]
    TokenExpired,

    #[error("Token issuer does not match")]
    IssuerMismatch,

    #[error("Token audience does not match")]
    AudienceMismatch,

    #[error("Token use does not match")]
    TokenUseMismatch,

    #[error("Key set fetch failed: {0}")]
    KeySetFetch(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// Caller-visible outcome for this error.
    pub fn rejection_kind(&self) -> RejectionKind {
        match self {
            AuthError::KeySetFetch(_) | AuthError::Internal => RejectionKind::ServiceError,
            AuthError::MalformedAuthorizationHeader
            | AuthError::MalformedToken
            | AuthError::UnknownSigningKey
            | AuthError::SignatureInvalid
            | AuthError::TokenExpired
            | AuthError::IssuerMismatch
            | AuthError::AudienceMismatch
            | AuthError::TokenUseMismatch => RejectionKind::Unauthorized,
        }
    }

    /// Stable label used in logs and the `reason` metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MalformedAuthorizationHeader => "malformed_authorization_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnknownSigningKey => "unknown_signing_key",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::TokenUseMismatch => "token_use_mismatch",
            AuthError::KeySetFetch(_) => "key_set_fetch",
            AuthError::Internal => "internal",
        }
    }

    /// Collapse into the opaque rejection handed back to the caller.
    pub fn into_rejection(self) -> Rejection {
        Rejection {
            kind: self.rejection_kind(),
            reason: self.reason(),
        }
    }
}

impl From<KeyCacheError> for AuthError {
    fn from(err: KeyCacheError) -> Self {
        match err {
            KeyCacheError::UnknownSigningKey => AuthError::UnknownSigningKey,
            KeyCacheError::Fetch(detail) => AuthError::KeySetFetch(detail),
        }
    }
}

/// The two outcomes a caller can observe for a refused request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Credential judged and refused.
    Unauthorized,
    /// Credential could not be judged.
    ServiceError,
}

impl RejectionKind {
    /// HTTP status for this outcome.
    pub fn status_code(self) -> StatusCode {
        match self {
            RejectionKind::Unauthorized => StatusCode::UNAUTHORIZED,
            RejectionKind::ServiceError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label for the `outcome` metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionKind::Unauthorized => "unauthorized",
            RejectionKind::ServiceError => "service_error",
        }
    }
}

/// Refusal returned to the caller.
///
/// Carries the internal `reason` label for logging; the HTTP response only
/// reveals the [`RejectionKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let (code, message) = match self.kind {
            RejectionKind::Unauthorized => ("UNAUTHORIZED", "Unauthorized"),
            RejectionKind::ServiceError => ("INTERNAL_ERROR", "Internal server error"),
        };

        let status = self.kind.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }

        response
    }
}
