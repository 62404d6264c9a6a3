//! Bearer token extraction from the inbound authorization field.

use crate::errors::AuthError;

const BEARER_SCHEME: &str = "Bearer";

/// Return the token from a `Bearer <token>` authorization value.
///
/// The value must be exactly two space-separated segments with the scheme
/// spelled `Bearer`. The token segment is returned as-is; its structure is
/// the verifier's concern.
///
/// # Errors
///
/// Returns `AuthError::MalformedAuthorizationHeader` if the field is absent,
/// empty, uses another scheme, or has a segment count other than two.
pub fn extract_bearer_token(field: Option<&str>) -> Result<&str, AuthError> {
    let Some(value) = field else {
        tracing::debug!(target: "authz.extract", "Authorization field missing");
        return Err(AuthError::MalformedAuthorizationHeader);
    };

    let mut segments = value.split(' ');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => {
            tracing::debug!(
                target: "authz.extract",
                field_len = value.len(),
                "Authorization field is not a bearer credential"
            );
            Err(AuthError::MalformedAuthorizationHeader)
        }
    }
}
