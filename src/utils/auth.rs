//! Authentication utilities for API requests
//!
//! Most providers take a plain bearer token. The Zhipu-style provider
//! instead expects a short-lived signed token synthesized from a compound
//! `id.secret` credential before every call; [`signed_bearer_token`]
//! builds it. The google-style provider authenticates with an API-key
//! query parameter and never passes through here.

use std::error::Error;
use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use serde_json::json;

/// Signed tokens expire two minutes after issuance.
const SIGNED_TOKEN_TTL_MS: i64 = 2 * 60 * 1000;

/// Add bearer-token authentication to an HTTP request.
pub fn add_auth_headers(request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    request.header("Authorization", format!("Bearer {api_key}"))
}

/// A compound credential did not match the expected `id.secret` shape.
#[derive(Debug)]
pub struct CredentialFormatError {
    message: String,
}

impl CredentialFormatError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CredentialFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CredentialFormatError {}

/// Synthesize a time-boxed signed bearer token from an `id.secret`
/// credential: base64url(header) `.` base64url(payload) `.`
/// base64url(HMAC-SHA256 signature), expiring two minutes after
/// `now_ms`.
pub fn signed_bearer_token(api_key: &str, now_ms: i64) -> Result<String, CredentialFormatError> {
    let (id, secret) = api_key
        .split_once('.')
        .filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
        .ok_or_else(|| CredentialFormatError::new("Invalid API key format. Expected ID.SECRET"))?;

    let header = json!({
        "alg": "HS256",
        "sign_type": "SIGN",
        "typ": "JWT",
    });
    let payload = json!({
        "api_key": id,
        "exp": now_ms + SIGNED_TOKEN_TTL_MS,
        "timestamp": now_ms,
    });

    let encoded_header = URL_SAFE_NO_PAD.encode(header.to_string());
    let encoded_payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    let signing_input = format!("{encoded_header}.{encoded_payload}");

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let signature = hmac::sign(&key, signing_input.as_bytes());
    let encoded_signature = URL_SAFE_NO_PAD.encode(signature.as_ref());

    Ok(format!("{signing_input}.{encoded_signature}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn signed_token_has_three_base64url_segments() {
        let token = signed_bearer_token("my-id.my-secret", 1_700_000_000_000).unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        for segment in &segments {
            assert!(URL_SAFE_NO_PAD.decode(segment).is_ok());
        }
    }

    #[test]
    fn signed_token_payload_carries_id_and_expiry() {
        let now_ms = 1_700_000_000_000;
        let token = signed_bearer_token("my-id.my-secret", now_ms).unwrap();
        let payload_segment = token.split('.').nth(1).unwrap();
        let payload: Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_segment).unwrap()).unwrap();

        assert_eq!(payload["api_key"], "my-id");
        assert_eq!(payload["timestamp"], now_ms);
        assert_eq!(payload["exp"], now_ms + SIGNED_TOKEN_TTL_MS);
    }

    #[test]
    fn signed_token_signature_verifies_with_the_secret() {
        let token = signed_bearer_token("my-id.my-secret", 1_700_000_000_000).unwrap();
        let (signing_input, signature) = token.rsplit_once('.').unwrap();

        let key = hmac::Key::new(hmac::HMAC_SHA256, b"my-secret");
        let signature_bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
        assert!(hmac::verify(&key, signing_input.as_bytes(), &signature_bytes).is_ok());
    }

    #[test]
    fn malformed_compound_credentials_are_rejected() {
        assert!(signed_bearer_token("no-separator", 0).is_err());
        assert!(signed_bearer_token(".secret-only", 0).is_err());
        assert!(signed_bearer_token("id-only.", 0).is_err());
    }
}
