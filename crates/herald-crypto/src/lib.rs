//! Herald crypto library
//!
//! ## Primitives
//!
//! - **Webhook**: HMAC-SHA256 over `message_id + timestamp + body`, `sha256=<hex>`
//! - **Sealing**: ChaCha20-Poly1305 AEAD for signing secrets stored at rest
//! - **Randomness**: OS-backed hex secrets
//! - **Comparison**: constant-time string equality for bearer tokens and signatures

pub mod compare;
pub mod error;
pub mod random;
pub mod sealed;
pub mod webhook;

pub use compare::constant_time_str_eq;
pub use error::CryptoError;
pub use random::random_hex;
pub use sealed::{NONCE_SIZE, SealedSecret, SecretSealer};
pub use webhook::WebhookVerifier;
