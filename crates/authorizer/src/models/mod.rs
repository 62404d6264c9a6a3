//! Inbound request model.
//!
//! The gateway invokes the authorizer with its token-authorizer event:
//!
//! ```json
//! {
//!   "type": "TOKEN",
//!   "authorizationToken": "Bearer eyJ...",
//!   "methodArn": "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/GET/collections",
//!   "requestContext": {"requestId": "c6af9ac6", "identity": {"sourceIp": "203.0.113.7"}}
//! }
//! ```

use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// One authorization invocation.
///
/// `authorization_token` holds the raw field and is redacted in Debug output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingAuthorizationRequest {
    /// Event type as sent by the gateway (`TOKEN`); informational only.
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,

    /// Raw authorization field value.
    #[serde(default)]
    pub authorization_token: Option<SecretString>,

    /// Identifier of the API method being invoked.
    pub method_arn: String,

    /// Pass-through invocation metadata.
    #[serde(default)]
    pub request_context: Option<RequestContext>,
}

impl IncomingAuthorizationRequest {
    pub fn new(authorization_token: Option<&str>, method_arn: &str) -> Self {
        Self {
            event_type: Some("TOKEN".to_string()),
            authorization_token: authorization_token.map(SecretString::from),
            method_arn: method_arn.to_string(),
            request_context: None,
        }
    }

    /// Raw authorization field, if present.
    pub fn authorization_field(&self) -> Option<&str> {
        self.authorization_token
            .as_ref()
            .map(ExposeSecret::expose_secret)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.request_id.as_deref())
    }

    pub fn source_ip(&self) -> Option<&str> {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.identity.as_ref())
            .and_then(|identity| identity.source_ip.as_deref())
    }
}

/// Invocation metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub request_id: Option<String>,

    #[serde(default)]
    pub identity: Option<RequestIdentity>,
}

/// Caller identity as observed by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdentity {
    #[serde(default)]
    pub source_ip: Option<String>,
}

/// Readiness probe response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,

    pub jwks: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}
