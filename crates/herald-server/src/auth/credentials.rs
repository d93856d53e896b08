//! Credential store: per-subject and per-static-token signing secrets.
//!
//! Secrets never leave this module sealed-side up; callers receive opened
//! secrets wrapped in `Zeroizing`.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use herald_core::db::unix_timestamp;
use herald_crypto::{SecretSealer, random_hex};

use super::AuthError;
use super::codec::expiry_after;
use crate::storage::{Credential, HeraldDatabase, NewStaticToken, REVOKED_MARKER, StaticToken};

/// Bytes of randomness in a signing secret (the SHA-256 block size).
pub const SECRET_BYTES: usize = 64;

#[derive(Clone)]
pub struct CredentialStore {
    db: HeraldDatabase,
    sealer: Arc<SecretSealer>,
}

impl CredentialStore {
    pub fn new(db: HeraldDatabase, sealer: Arc<SecretSealer>) -> Self {
        Self { db, sealer }
    }

    pub async fn get(&self, subject_id: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.db.get_credential(subject_id).await?)
    }

    /// Return the subject's credential with a freshly rotated refresh
    /// generation, creating it with a new secret on first login.
    #[instrument(skip(self))]
    pub async fn login(&self, subject_id: &str) -> Result<Credential, AuthError> {
        if self.db.get_credential(subject_id).await?.is_some() {
            return self.rotate_refresh_uid(subject_id).await;
        }

        let secret = random_hex(SECRET_BYTES);
        let sealed = self.sealer.seal(&secret)?;
        let credential = self
            .db
            .create_credential(subject_id, &sealed, &new_refresh_uid())
            .await?;
        info!(subject_id, "Credential created");
        Ok(credential)
    }

    /// Replace the refresh generation, invalidating every outstanding refresh token.
    pub async fn rotate_refresh_uid(&self, subject_id: &str) -> Result<Credential, AuthError> {
        if !self.db.set_refresh_uid(subject_id, &new_refresh_uid()).await? {
            return Err(AuthError::Unauthenticated);
        }
        self.db
            .get_credential(subject_id)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    /// End the refresh lineage by marking the generation revoked.
    #[instrument(skip(self))]
    pub async fn revoke(&self, subject_id: &str) -> Result<(), AuthError> {
        let Some(credential) = self.db.get_credential(subject_id).await? else {
            return Err(AuthError::Unauthenticated);
        };
        if credential.is_logged_out() {
            debug!(subject_id, "Credential already revoked");
            return Ok(());
        }
        let revoked = format!("{REVOKED_MARKER}:{}", credential.refresh_uid);
        self.db.set_refresh_uid(subject_id, &revoked).await?;
        info!(subject_id, "Refresh lineage revoked");
        Ok(())
    }

    /// Provision a static token with its own secret.
    pub async fn create_static_token(
        &self,
        creator_id: &str,
        scopes: &str,
        purpose: &str,
        ttl_secs: i64,
    ) -> Result<StaticToken, AuthError> {
        let expires_at = expiry_after(unix_timestamp(), ttl_secs)?;
        let id = uuid::Uuid::new_v4().to_string();
        let sealed = self.sealer.seal(&random_hex(SECRET_BYTES))?;
        let token = self
            .db
            .create_static_token(&NewStaticToken {
                id: &id,
                creator_id,
                scopes,
                purpose,
                secret: &sealed,
                expires_at,
            })
            .await?;
        Ok(token)
    }

    pub async fn get_static_token(&self, id: &str) -> Result<Option<StaticToken>, AuthError> {
        Ok(self.db.get_static_token(id).await?)
    }

    pub async fn revoke_static_token(&self, id: &str) -> Result<bool, AuthError> {
        Ok(self.db.revoke_static_token(id).await?)
    }

    pub fn open_credential_secret(
        &self,
        credential: &Credential,
    ) -> Result<Zeroizing<String>, AuthError> {
        Ok(self.sealer.open(&credential.sealed_secret())?)
    }

    pub fn open_static_secret(&self, token: &StaticToken) -> Result<Zeroizing<String>, AuthError> {
        Ok(self.sealer.open(&token.sealed_secret())?)
    }
}

fn new_refresh_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}
