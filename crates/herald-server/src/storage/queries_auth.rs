//! Credential and static-token queries.

use herald_core::db::unix_timestamp;
use herald_crypto::SealedSecret;

use super::db::{DatabaseError, HeraldDatabase};
use super::models::{Credential, StaticToken};

/// Parameters for provisioning a static token.
#[derive(Debug, Clone)]
pub struct NewStaticToken<'a> {
    pub id: &'a str,
    pub creator_id: &'a str,
    pub scopes: &'a str,
    pub purpose: &'a str,
    pub secret: &'a SealedSecret,
    pub expires_at: i64,
}

impl HeraldDatabase {
    // =========================================================================
    // Credentials
    // =========================================================================

    /// Create the credential for a subject's first login.
    pub async fn create_credential(
        &self,
        subject_id: &str,
        secret: &SealedSecret,
        refresh_uid: &str,
    ) -> Result<Credential, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO credentials (subject_id, secret_ciphertext, secret_nonce, refresh_uid, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(subject_id)
        .bind(&secret.ciphertext)
        .bind(&secret.nonce)
        .bind(refresh_uid)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_credential(subject_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Credential {subject_id}")))
    }

    pub async fn get_credential(&self, subject_id: &str) -> Result<Option<Credential>, DatabaseError> {
        let credential =
            sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE subject_id = ?")
                .bind(subject_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(credential)
    }

    /// Replace the subject's refresh generation. Last write wins.
    pub async fn set_refresh_uid(
        &self,
        subject_id: &str,
        refresh_uid: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE credentials SET refresh_uid = ?, updated_at = ? WHERE subject_id = ?",
        )
        .bind(refresh_uid)
        .bind(unix_timestamp())
        .bind(subject_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Static tokens
    // =========================================================================

    pub async fn create_static_token(
        &self,
        params: &NewStaticToken<'_>,
    ) -> Result<StaticToken, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO static_tokens (id, creator_id, scopes, purpose, secret_ciphertext, secret_nonce, created_at, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.creator_id)
        .bind(params.scopes)
        .bind(params.purpose)
        .bind(&params.secret.ciphertext)
        .bind(&params.secret.nonce)
        .bind(now)
        .bind(params.expires_at)
        .execute(self.pool())
        .await?;

        self.get_static_token(params.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Static token {}", params.id)))
    }

    pub async fn get_static_token(&self, id: &str) -> Result<Option<StaticToken>, DatabaseError> {
        let token = sqlx::query_as::<_, StaticToken>("SELECT * FROM static_tokens WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(token)
    }

    /// Tokens provisioned by a subject, newest first.
    pub async fn list_static_tokens(
        &self,
        creator_id: &str,
    ) -> Result<Vec<StaticToken>, DatabaseError> {
        let tokens = sqlx::query_as::<_, StaticToken>(
            "SELECT * FROM static_tokens WHERE creator_id = ? ORDER BY created_at DESC",
        )
        .bind(creator_id)
        .fetch_all(self.pool())
        .await?;

        Ok(tokens)
    }

    /// Mark a static token revoked. Returns `false` when no such token exists.
    pub async fn revoke_static_token(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE static_tokens SET revoked = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
