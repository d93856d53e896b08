//! Shared fixtures for auth tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;

use herald_crypto::{SecretSealer, random_hex};

use super::codec::TokenCodec;
use super::credentials::CredentialStore;
use super::identity::{IdentityError, IdentityProvider};
use crate::storage::HeraldDatabase;

pub const ISSUER: &str = "herald-test";

pub async fn test_store() -> CredentialStore {
    let db = HeraldDatabase::open_in_memory().await.unwrap();
    let sealer = SecretSealer::from_hex_key(&random_hex(32)).unwrap();
    CredentialStore::new(db, Arc::new(sealer))
}

pub async fn test_codec() -> TokenCodec {
    TokenCodec::new(ISSUER, 600, 1_209_600, test_store().await)
}

/// Identity provider that accepts the code `good-<subject>` and grants fixed scopes.
pub struct FakeIdentity {
    pub scopes: Vec<String>,
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<String, IdentityError> {
        code.strip_prefix("good-")
            .map(str::to_string)
            .ok_or_else(|| IdentityError::Rejected("bad code".into()))
    }

    async fn scopes_for(&self, _subject_id: &str) -> Result<Vec<String>, IdentityError> {
        Ok(self.scopes.clone())
    }
}
