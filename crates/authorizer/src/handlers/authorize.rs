//! Gateway invocation handler.

use crate::authorizer::AuthorizationOutcome;
use crate::models::IncomingAuthorizationRequest;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Handler for POST /authorize
///
/// Body is the gateway's token-authorizer event. Responds 200 with the policy
/// document, 401 for refused credentials, or 500 when the authorizer cannot
/// judge the credential. Bodies that are not valid events are refused by
/// axum's JSON extractor before reaching the authorizer.
#[tracing::instrument(skip_all, name = "authz.handler.authorize")]
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IncomingAuthorizationRequest>,
) -> AuthorizationOutcome {
    state.authorizer.authorize(&request).await
}
