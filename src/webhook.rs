//! Signed video-session webhooks.
//!
//! The sender puts `base64(HMAC-SHA256(secret, body))` in the
//! `Authorization` header. A verified body is relayed unchanged.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Webhook receiver is not configured")]
    NotConfigured,

    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook body is not valid JSON: {0}")]
    MalformedBody(String),
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<Vec<u8>>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(|s| s.as_bytes().to_vec()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify the signature and parse the body.
    pub fn verify(&self, body: &[u8], authorization: Option<&str>) -> Result<Value, WebhookError> {
        let secret = self.secret.as_deref().ok_or(WebhookError::NotConfigured)?;
        let header = authorization
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(WebhookError::MissingSignature)?;
        let signature = STANDARD
            .decode(header)
            .map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::NotConfigured)?;
        mac.update(body);
        mac.verify_slice(&signature)
            .map_err(|_| WebhookError::InvalidSignature)?;

        serde_json::from_slice(body).map_err(|e| WebhookError::MalformedBody(e.to_string()))
    }
}

/// Compute the header value a sender would attach to `body`.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"event":"room_finished","room":{"name":"p_c"}}"#;

    #[test]
    fn valid_signature_yields_event() {
        let verifier = WebhookVerifier::new(Some("whsec"));
        let sig = sign("whsec", BODY).unwrap();
        let event = verifier.verify(BODY, Some(&sig)).unwrap();
        assert_eq!(event["event"], "room_finished");
    }

    #[test]
    fn tampered_body_is_rejected() {
        let verifier = WebhookVerifier::new(Some("whsec"));
        let sig = sign("whsec", BODY).unwrap();
        let err = verifier.verify(br#"{"event":"forged"}"#, Some(&sig)).unwrap_err();
        assert_eq!(err, WebhookError::InvalidSignature);
    }

    #[test]
    fn wrong_secret_and_missing_header_are_rejected() {
        let verifier = WebhookVerifier::new(Some("whsec"));
        let sig = sign("other", BODY).unwrap();
        assert_eq!(verifier.verify(BODY, Some(&sig)).unwrap_err(), WebhookError::InvalidSignature);
        assert_eq!(verifier.verify(BODY, None).unwrap_err(), WebhookError::MissingSignature);
        assert_eq!(verifier.verify(BODY, Some("%%%")).unwrap_err(), WebhookError::InvalidSignature);
    }

    #[test]
    fn unconfigured_receiver_rejects_everything() {
        let verifier = WebhookVerifier::new(None);
        assert!(!verifier.is_configured());
        let sig = sign("whsec", BODY).unwrap();
        assert_eq!(verifier.verify(BODY, Some(&sig)).unwrap_err(), WebhookError::NotConfigured);
        assert!(!WebhookVerifier::new(Some("")).is_configured());
    }

    #[test]
    fn signed_garbage_is_malformed() {
        let verifier = WebhookVerifier::new(Some("whsec"));
        let sig = sign("whsec", b"not json").unwrap();
        assert!(matches!(verifier.verify(b"not json", Some(&sig)), Err(WebhookError::MalformedBody(_))));
    }
}
