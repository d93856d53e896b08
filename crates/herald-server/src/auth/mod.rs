//! Authentication for the Herald server.
//!
//! Per-subject HS256 tokens (access, refresh, static), sealed signing
//! secrets, the request gate, and the login/refresh/logout service.

pub mod claims;
pub mod codec;
pub mod cookie;
pub mod credentials;
pub mod gate;
pub mod identity;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{Audience, Claims};
pub use codec::{IssuedToken, KeyOwner, TokenCodec, Verified};
pub use credentials::CredentialStore;
pub use gate::{AuthGate, Endpoint, Principal, PrincipalKind};
pub use identity::{DiscordIdentity, IdentityError, IdentityProvider};
pub use service::AuthService;

/// Authorization failures.
///
/// Never says which check failed; the cause is logged at debug level.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<herald_core::db::DatabaseError> for AuthError {
    fn from(e: herald_core::db::DatabaseError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<herald_crypto::CryptoError> for AuthError {
    fn from(e: herald_crypto::CryptoError) -> Self {
        Self::Internal(e.to_string())
    }
}
