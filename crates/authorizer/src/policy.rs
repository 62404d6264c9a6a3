//! Access decisions.
//!
//! An [`AccessDecision`] is what the gateway enforces: who the caller is, the
//! effect, the one resource it applies to, and a flat context map forwarded
//! to the backend handlers. On the wire it is the gateway's policy response:
//!
//! ```json
//! {
//!   "principalId": "user-1",
//!   "policyDocument": {
//!     "Version": "2012-10-17",
//!     "Statement": [{
//!       "Action": "execute-api:Invoke",
//!       "Effect": "Allow",
//!       "Resource": "arn:aws:execute-api:us-east-1:123456789012:abc/prod/GET/collections"
//!     }]
//!   },
//!   "context": {"sub": "user-1", "tokenUse": "access", "expiresAt": 1700003600}
//! }
//! ```

use crate::auth::claims::VerifiedClaims;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Policy language version understood by the gateway.
pub const POLICY_VERSION: &str = "2012-10-17";

/// The single action a decision grants or denies.
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

/// Decision effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Scalar value in the decision context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Number(i64),
    String(String),
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::String(value.to_string())
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        ContextValue::Number(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

/// Outcome of a successful authorization, scoped to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "PolicyResponse", try_from = "PolicyResponse")]
pub struct AccessDecision {
    principal_id: String,
    effect: Effect,
    resource: String,
    context: BTreeMap<String, ContextValue>,
}

impl AccessDecision {
    pub fn new(
        principal_id: String,
        effect: Effect,
        resource: String,
        context: BTreeMap<String, ContextValue>,
    ) -> Self {
        Self {
            principal_id,
            effect,
            resource,
            context,
        }
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn context(&self) -> &BTreeMap<String, ContextValue> {
        &self.context
    }
}

/// Build the decision for a verified token.
///
/// The resource is exactly the invoked method's identifier; decisions are
/// never widened to wildcards. Context keys:
///
/// | Key         | Source       | Present            |
/// |-------------|--------------|--------------------|
/// | `sub`       | `sub`        | always             |
/// | `tokenUse`  | `token_use`  | always             |
/// | `expiresAt` | `exp`        | always             |
/// | `clientId`  | `client_id`  | if in token        |
/// | `username`  | `username`   | if in token        |
/// | `scope`     | `scope`      | if in token        |
/// | `authTime`  | `auth_time`  | if in token        |
pub fn build_decision(claims: &VerifiedClaims, resource: &str) -> AccessDecision {
    let mut context = BTreeMap::new();
    context.insert("sub".to_string(), ContextValue::from(claims.subject()));
    context.insert("tokenUse".to_string(), ContextValue::from(claims.token_use()));
    context.insert("expiresAt".to_string(), ContextValue::from(claims.expires_at()));

    if let Some(client_id) = claims.client_id() {
        context.insert("clientId".to_string(), ContextValue::from(client_id));
    }
    if let Some(username) = claims.username() {
        context.insert("username".to_string(), ContextValue::from(username));
    }
    if let Some(scope) = claims.scope() {
        context.insert("scope".to_string(), ContextValue::from(scope));
    }
    if let Some(auth_time) = claims.auth_time() {
        context.insert("authTime".to_string(), ContextValue::from(auth_time));
    }

    AccessDecision::new(
        claims.subject().to_string(),
        Effect::Allow,
        resource.to_string(),
        context,
    )
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyResponse {
    principal_id: String,
    policy_document: PolicyDocument,
    #[serde(default)]
    context: BTreeMap<String, ContextValue>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument {
    version: String,
    statement: Vec<PolicyStatement>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyStatement {
    action: String,
    effect: Effect,
    resource: String,
}

/// Policy response that does not describe a single-resource invoke decision.
#[derive(Debug, Error)]
pub enum PolicyFormatError {
    #[error("expected exactly one statement, found {0}")]
    StatementCount(usize),

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
}

impl From<AccessDecision> for PolicyResponse {
    fn from(decision: AccessDecision) -> Self {
        PolicyResponse {
            principal_id: decision.principal_id,
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement: vec![PolicyStatement {
                    action: INVOKE_ACTION.to_string(),
                    effect: decision.effect,
                    resource: decision.resource,
                }],
            },
            context: decision.context,
        }
    }
}

impl TryFrom<PolicyResponse> for AccessDecision {
    type Error = PolicyFormatError;

    fn try_from(response: PolicyResponse) -> Result<Self, Self::Error> {
        let count = response.policy_document.statement.len();
        let mut statements = response.policy_document.statement.into_iter();

        let (Some(statement), None) = (statements.next(), statements.next()) else {
            return Err(PolicyFormatError::StatementCount(count));
        };
        if statement.action != INVOKE_ACTION {
            return Err(PolicyFormatError::UnsupportedAction(statement.action));
        }

        Ok(AccessDecision::new(
            response.principal_id,
            statement.effect,
            statement.resource,
            response.context,
        ))
    }
}
