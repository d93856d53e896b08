//! Webhook authentication for inbound EventSub deliveries.
//!
//! The signature covers the concatenation `message_id + timestamp + body`
//! (no separators) and is carried as `sha256=<lowercase hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::compare::constant_time_str_eq;

type HmacSha256 = Hmac<Sha256>;

/// Signature scheme prefix on the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies webhook signatures with a shared secret.
pub struct WebhookVerifier {
    secret: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Compute the expected signature header value.
    ///
    /// Returns `None` when the secret is empty.
    pub fn sign(&self, message_id: &str, timestamp: &str, body: &[u8]) -> Option<String> {
        if self.secret.is_empty() {
            return None;
        }
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(message_id.as_bytes());
        mac.update(timestamp.as_bytes());
        mac.update(body);
        Some(format!(
            "{SIGNATURE_PREFIX}{}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Check a delivery's signature header.
    ///
    /// Fails closed when the secret, message id, timestamp or signature is empty.
    pub fn verify(&self, message_id: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
        if message_id.is_empty() || timestamp.is_empty() || signature.is_empty() {
            return false;
        }
        self.sign(message_id, timestamp, body)
            .is_some_and(|expected| constant_time_str_eq(&expected, signature))
    }
}
