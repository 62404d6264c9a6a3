//! Authorizer entry point.
//!
//! Runs one invocation end to end (extract, verify, decide) and collapses
//! every failure into a [`Rejection`]. Each invocation logs and records its
//! outcome; the raw token never appears in either.

use crate::auth::extract::extract_bearer_token;
use crate::auth::jwt::TokenValidator;
use crate::errors::{AuthError, Rejection, RejectionKind};
use crate::models::IncomingAuthorizationRequest;
use crate::observability::metrics::record_decision;
use crate::policy::{build_decision, AccessDecision};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Allow(AccessDecision),
    Reject(Rejection),
}

impl AuthorizationOutcome {
    pub fn decision(&self) -> Option<&AccessDecision> {
        match self {
            AuthorizationOutcome::Allow(decision) => Some(decision),
            AuthorizationOutcome::Reject(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            AuthorizationOutcome::Allow(_) => None,
            AuthorizationOutcome::Reject(rejection) => Some(*rejection),
        }
    }
}

impl IntoResponse for AuthorizationOutcome {
    fn into_response(self) -> Response {
        match self {
            AuthorizationOutcome::Allow(decision) => (StatusCode::OK, Json(decision)).into_response(),
            AuthorizationOutcome::Reject(rejection) => rejection.into_response(),
        }
    }
}

/// Per-invocation orchestrator.
pub struct Authorizer {
    validator: Arc<dyn TokenValidator>,
}

impl Authorizer {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }

    /// Decide one invocation.
    ///
    /// A malformed authorization field is rejected before the validator runs.
    /// Verification failures are `Unauthorized`, except key set fetch failures
    /// and internal faults, which are `ServiceError`.
    #[instrument(
        skip_all,
        fields(request_id = request.request_id().unwrap_or("-"))
    )]
    pub async fn authorize(&self, request: &IncomingAuthorizationRequest) -> AuthorizationOutcome {
        let start = Instant::now();

        match self.decide(request).await {
            Ok(decision) => {
                tracing::info!(
                    target: "authz.authorizer",
                    principal_id = %decision.principal_id(),
                    resource = %decision.resource(),
                    "Request authorized"
                );
                record_decision("allow", "ok", start.elapsed());
                AuthorizationOutcome::Allow(decision)
            }
            Err(err) => {
                let rejection = err.clone().into_rejection();
                match rejection.kind {
                    RejectionKind::Unauthorized => tracing::info!(
                        target: "authz.authorizer",
                        reason = rejection.reason,
                        source_ip = request.source_ip().unwrap_or("-"),
                        "Request rejected"
                    ),
                    RejectionKind::ServiceError => tracing::error!(
                        target: "authz.authorizer",
                        reason = rejection.reason,
                        error = %err,
                        "Request could not be authorized"
                    ),
                }
                record_decision(rejection.kind.as_str(), rejection.reason, start.elapsed());
                AuthorizationOutcome::Reject(rejection)
            }
        }
    }

    async fn decide(&self, request: &IncomingAuthorizationRequest) -> Result<AccessDecision, AuthError> {
        let token = extract_bearer_token(request.authorization_field())?;
        let claims = self.validator.validate(token).await?;
        Ok(build_decision(&claims, &request.method_arn))
    }
}
