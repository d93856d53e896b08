//! Token issuance and verification.
//!
//! Every token is HS256-signed with a secret owned by one key holder: the
//! subject for access and refresh tokens, the static-token record for static
//! tokens. The header `kid` names that owner so the verifier can fetch the
//! right key before checking the signature.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

use herald_core::db::unix_timestamp;
use herald_core::scopes::join_scopes;

use super::AuthError;
use super::claims::{Audience, Claims};
use super::credentials::CredentialStore;
use crate::storage::{Credential, StaticToken};

/// A signed token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Expiry `ttl_secs` after `now`, rejecting lifetimes past the end of time.
pub(crate) fn expiry_after(now: i64, ttl_secs: i64) -> Result<i64, AuthError> {
    now.checked_add(ttl_secs)
        .ok_or_else(|| AuthError::BadRequest("token lifetime is out of range".into()))
}

/// The record whose secret signed a token.
#[derive(Debug, Clone)]
pub enum KeyOwner {
    Credential(Credential),
    Static(StaticToken),
}

/// A token that passed every check.
#[derive(Debug, Clone)]
pub struct Verified {
    pub claims: Claims,
    pub owner: KeyOwner,
}

/// Issues and verifies Herald tokens.
#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    store: CredentialStore,
}

impl TokenCodec {
    pub fn new(
        issuer: impl Into<String>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
        store: CredentialStore,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            access_ttl_secs,
            refresh_ttl_secs,
            store,
        }
    }

    pub const fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub const fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Issue a short-lived access token carrying `scopes`.
    pub fn issue_access(
        &self,
        credential: &Credential,
        scopes: &[String],
    ) -> Result<IssuedToken, AuthError> {
        let now = unix_timestamp();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: credential.subject_id.clone(),
            aud: Audience::Access,
            iat: now,
            exp: expiry_after(now, self.access_ttl_secs)?,
            jti: None,
            scopes: join_scopes(scopes),
        };
        let secret = self.store.open_credential_secret(credential)?;
        let token = self.mint(&claims, &credential.subject_id, &secret)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Issue a refresh token bound to the credential's current refresh generation.
    pub fn issue_refresh(&self, credential: &Credential) -> Result<IssuedToken, AuthError> {
        let now = unix_timestamp();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: credential.subject_id.clone(),
            aud: Audience::Refresh,
            iat: now,
            exp: expiry_after(now, self.refresh_ttl_secs)?,
            jti: Some(credential.refresh_uid.clone()),
            scopes: String::new(),
        };
        let secret = self.store.open_credential_secret(credential)?;
        let token = self.mint(&claims, &credential.subject_id, &secret)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Sign the JWT form of a provisioned static token.
    pub fn issue_static(&self, token: &StaticToken) -> Result<IssuedToken, AuthError> {
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: token.creator_id.clone(),
            aud: Audience::Static,
            iat: token.created_at,
            exp: token.expires_at,
            jti: Some(token.id.clone()),
            scopes: token.scopes.clone(),
        };
        let secret = self.store.open_static_secret(token)?;
        let signed = self.mint(&claims, &token.id, &secret)?;
        Ok(IssuedToken {
            token: signed,
            expires_at: claims.exp,
        })
    }

    pub(crate) fn mint(&self, claims: &Claims, kid: &str, secret: &str) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AuthError::Internal(format!("Token creation failed: {e}")))
    }

    /// Verify a token against the accepted audiences.
    ///
    /// Checks, in order: signature against the owner's key, issuer, audience,
    /// expiry (no leeway), then owner-specific state. Any failure is reported
    /// as [`AuthError::Unauthenticated`].
    pub async fn verify(&self, token: &str, accepted: &[Audience]) -> Result<Verified, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| reject("malformed header"))?;
        if header.alg != Algorithm::HS256 {
            return Err(reject("unexpected algorithm"));
        }
        let kid = header.kid.ok_or_else(|| reject("missing kid"))?;

        let owner = self.resolve_owner(&kid).await?.ok_or_else(|| reject("unknown kid"))?;
        let secret = match &owner {
            KeyOwner::Credential(credential) => self.store.open_credential_secret(credential)?,
            KeyOwner::Static(static_token) => self.store.open_static_secret(static_token)?,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|_| reject("signature"))?
        .claims;

        if claims.iss != self.issuer {
            return Err(reject("issuer"));
        }
        if !accepted.contains(&claims.aud) {
            return Err(reject("audience"));
        }
        if unix_timestamp() >= claims.exp {
            return Err(reject("expired"));
        }

        match (&owner, claims.aud) {
            (KeyOwner::Credential(credential), Audience::Access) => {
                if claims.sub != credential.subject_id {
                    return Err(reject("subject"));
                }
            }
            (KeyOwner::Credential(credential), Audience::Refresh) => {
                if claims.sub != credential.subject_id {
                    return Err(reject("subject"));
                }
                if claims.jti.as_deref() != Some(credential.refresh_uid.as_str()) {
                    return Err(reject("stale refresh generation"));
                }
            }
            (KeyOwner::Static(static_token), Audience::Static) => {
                if static_token.revoked {
                    return Err(reject("static token revoked"));
                }
                if claims.sub != static_token.creator_id {
                    return Err(reject("static token creator"));
                }
                if claims.jti.as_deref() != Some(static_token.id.as_str()) {
                    return Err(reject("static token id"));
                }
            }
            _ => return Err(reject("audience does not match key owner")),
        }

        Ok(Verified { claims, owner })
    }

    async fn resolve_owner(&self, kid: &str) -> Result<Option<KeyOwner>, AuthError> {
        if let Some(credential) = self.store.get(kid).await? {
            return Ok(Some(KeyOwner::Credential(credential)));
        }
        Ok(self
            .store
            .get_static_token(kid)
            .await?
            .map(KeyOwner::Static))
    }
}

fn reject(step: &'static str) -> AuthError {
    debug!(step, "Token rejected");
    AuthError::Unauthenticated
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::test_support::{ISSUER, test_codec, test_store};

    const ACCESS_OR_STATIC: &[Audience] = &[Audience::Access, Audience::Static];

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn issue_and_verify_access_token() {
        let codec = test_codec().await;
        let cred = codec.store().login("42").await.unwrap();
        let issued = codec.issue_access(&cred, &scopes(&["login", "admin"])).unwrap();

        let verified = codec.verify(&issued.token, ACCESS_OR_STATIC).await.unwrap();
        assert_eq!(verified.claims.sub, "42");
        assert_eq!(verified.claims.aud, Audience::Access);
        assert_eq!(verified.claims.scope_list(), vec!["login", "admin"]);
        assert_eq!(verified.claims.exp - verified.claims.iat, 600);
        assert!(matches!(verified.owner, KeyOwner::Credential(_)));
    }

    #[tokio::test]
    async fn overflowing_lifetime_is_refused() {
        let codec = TokenCodec::new(ISSUER, i64::MAX, i64::MAX, test_store().await);
        let cred = codec.store().login("42").await.unwrap();

        assert!(matches!(
            codec.issue_access(&cred, &[]),
            Err(AuthError::BadRequest(_))
        ));
        assert!(matches!(
            codec.issue_refresh(&cred),
            Err(AuthError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn header_names_the_key_owner() {
        let codec = test_codec().await;
        let cred = codec.store().login("42").await.unwrap();
        let issued = codec.issue_access(&cred, &[]).unwrap();
        let header = jsonwebtoken::decode_header(&issued.token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn access_token_rejected_where_refresh_expected() {
        let codec = test_codec().await;
        let cred = codec.store().login("42").await.unwrap();
        let issued = codec.issue_access(&cred, &[]).unwrap();
        let err = codec.verify(&issued.token, &[Audience::Refresh]).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn refresh_token_dies_when_generation_rotates() {
        let codec = test_codec().await;
        let cred = codec.store().login("42").await.unwrap();
        let issued = codec.issue_refresh(&cred).unwrap();
        assert!(codec.verify(&issued.token, &[Audience::Refresh]).await.is_ok());

        codec.store().rotate_refresh_uid("42").await.unwrap();
        assert!(matches!(
            codec.verify(&issued.token, &[Audience::Refresh]).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_without_leeway() {
        let codec = test_codec().await;
        let cred = codec.store().login("42").await.unwrap();
        let now = unix_timestamp();
        let claims = Claims {
            iss: ISSUER.into(),
            sub: "42".into(),
            aud: Audience::Access,
            iat: now - 700,
            exp: now - 1,
            jti: None,
            scopes: "admin".into(),
        };
        let secret = codec.store().open_credential_secret(&cred).unwrap();
        let token = codec.mint(&claims, "42", &secret).unwrap();

        assert!(codec.verify(&token, ACCESS_OR_STATIC).await.is_err());
    }

    #[tokio::test]
    async fn foreign_issuer_is_rejected() {
        let codec = test_codec().await;
        let cred = codec.store().login("42").await.unwrap();
        let now = unix_timestamp();
        let claims = Claims {
            iss: "someone-else".into(),
            sub: "42".into(),
            aud: Audience::Access,
            iat: now,
            exp: now + 60,
            jti: None,
            scopes: String::new(),
        };
        let secret = codec.store().open_credential_secret(&cred).unwrap();
        let token = codec.mint(&claims, "42", &secret).unwrap();

        assert!(codec.verify(&token, ACCESS_OR_STATIC).await.is_err());
    }

    #[tokio::test]
    async fn token_signed_with_another_subjects_key_is_rejected() {
        let codec = test_codec().await;
        let alice = codec.store().login("alice").await.unwrap();
        codec.store().login("bob").await.unwrap();
        let now = unix_timestamp();
        let claims = Claims {
            iss: ISSUER.into(),
            sub: "bob".into(),
            aud: Audience::Access,
            iat: now,
            exp: now + 60,
            jti: None,
            scopes: "admin".into(),
        };
        let alice_secret = codec.store().open_credential_secret(&alice).unwrap();

        // Signed by alice but claiming bob's kid: signature check fails.
        let forged = codec.mint(&claims, "bob", &alice_secret).unwrap();
        assert!(codec.verify(&forged, ACCESS_OR_STATIC).await.is_err());

        // Signed by alice under her own kid but claiming bob as subject.
        let mismatched = codec.mint(&claims, "alice", &alice_secret).unwrap();
        assert!(codec.verify(&mismatched, ACCESS_OR_STATIC).await.is_err());
    }

    #[tokio::test]
    async fn unknown_kid_and_garbage_are_rejected() {
        let codec = test_codec().await;
        assert!(codec.verify("not-a-token", ACCESS_OR_STATIC).await.is_err());

        let cred = codec.store().login("42").await.unwrap();
        let secret = codec.store().open_credential_secret(&cred).unwrap();
        let now = unix_timestamp();
        let claims = Claims {
            iss: ISSUER.into(),
            sub: "42".into(),
            aud: Audience::Access,
            iat: now,
            exp: now + 60,
            jti: None,
            scopes: String::new(),
        };
        let token = codec.mint(&claims, "nobody", &secret).unwrap();
        assert!(codec.verify(&token, ACCESS_OR_STATIC).await.is_err());
    }

    #[tokio::test]
    async fn static_token_verifies_until_revoked() {
        let codec = test_codec().await;
        let record = codec
            .store()
            .create_static_token("42", "admin:stream", "ci", 3600)
            .await
            .unwrap();
        let issued = codec.issue_static(&record).unwrap();

        let verified = codec.verify(&issued.token, ACCESS_OR_STATIC).await.unwrap();
        assert_eq!(verified.claims.sub, "42");
        assert_eq!(verified.claims.jti.as_deref(), Some(record.id.as_str()));
        assert!(codec.verify(&issued.token, &[Audience::Access]).await.is_err());

        codec.store().revoke_static_token(&record.id).await.unwrap();
        assert!(codec.verify(&issued.token, ACCESS_OR_STATIC).await.is_err());
    }

    #[tokio::test]
    async fn static_audience_under_a_subject_key_is_rejected() {
        let codec = test_codec().await;
        let cred = codec.store().login("42").await.unwrap();
        let now = unix_timestamp();
        let claims = Claims {
            iss: ISSUER.into(),
            sub: "42".into(),
            aud: Audience::Static,
            iat: now,
            exp: now + 60,
            jti: Some("42".into()),
            scopes: "admin".into(),
        };
        let secret = codec.store().open_credential_secret(&cred).unwrap();
        let token = codec.mint(&claims, "42", &secret).unwrap();
        assert!(codec.verify(&token, ACCESS_OR_STATIC).await.is_err());
    }
}
