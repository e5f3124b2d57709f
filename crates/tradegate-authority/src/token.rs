//! Local JWT payload inspection.
//!
//! The confirmation flow needs the `sub` claim of the requesting party token
//! the authority just minted. The token is decoded locally without signature
//! verification: trust is delegated to the authority, which produced the
//! token one call earlier over the same channel.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::AuthorityError;

/// Extracts the `sub` claim from a JWT without verifying its signature.
///
/// Returns [`AuthorityError::Decode`] when the token is not a JWT, its
/// payload is not valid base64url JSON, or the `sub` claim is absent/empty.
pub fn subject_from_token(token: &str) -> Result<String, AuthorityError> {
    let payload = decode_payload(token)?;

    tracing::debug!(claims = %payload, "decoded token payload");

    match payload.get("sub").and_then(|v| v.as_str()) {
        Some(sub) if !sub.is_empty() => Ok(sub.to_string()),
        _ => Err(AuthorityError::Decode(
            "token payload has no sub claim".to_string(),
        )),
    }
}

fn decode_payload(token: &str) -> Result<serde_json::Value, AuthorityError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) if !payload.is_empty() => payload,
        _ => {
            return Err(AuthorityError::Decode(
                "token is not a JWT".to_string(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthorityError::Decode(format!("token payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthorityError::Decode(format!("token payload is not JSON: {e}")))
}
