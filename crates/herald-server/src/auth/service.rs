//! Login, refresh, logout, and static-token management.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use herald_core::scopes::{join_scopes, retain_valid_static_scopes};

use super::AuthError;
use super::codec::IssuedToken;
use super::cookie::{REFRESH_COOKIE, expired_refresh_cookie, read_cookie, refresh_cookie};
use super::gate::{AuthGate, Endpoint, Principal, PrincipalKind};
use super::identity::{IdentityError, IdentityProvider};
use crate::storage::Credential;

/// Scope required to provision or revoke static tokens.
pub const TOKEN_ADMIN_SCOPE: &str = "admin:tokens";

/// Tokens handed back after login or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub subject_id: String,
    pub access: IssuedToken,
    /// `Set-Cookie` value carrying the refresh token.
    pub refresh_cookie: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TouchStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "logged out")]
    LoggedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhoAmI {
    pub subject_id: String,
    pub scopes: Vec<String>,
    pub audience: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticTokenRequest {
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaticTokenIssued {
    pub id: String,
    pub token: String,
    pub scopes: Vec<String>,
    pub expires_at: i64,
}

pub struct AuthService {
    gate: AuthGate,
    identity: Arc<dyn IdentityProvider>,
    static_ttl_secs: i64,
}

impl AuthService {
    pub fn new(gate: AuthGate, identity: Arc<dyn IdentityProvider>, static_ttl_secs: i64) -> Self {
        Self {
            gate,
            identity,
            static_ttl_secs,
        }
    }

    pub const fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Complete an upstream OAuth login.
    ///
    /// `referer` is the page that started the login; the provider requires it
    /// as the redirect URI.
    #[instrument(skip(self, code))]
    pub async fn validate(&self, code: &str, referer: Option<&str>) -> Result<Session, AuthError> {
        let redirect_uri = referer.filter(|r| !r.is_empty()).ok_or_else(|| {
            warn!("Login without referer");
            AuthError::Forbidden
        })?;
        if code.is_empty() {
            return Err(AuthError::Forbidden);
        }

        let subject_id = self
            .identity
            .exchange_code(code, redirect_uri)
            .await
            .map_err(|e| {
                warn!(error = %e, "Code exchange failed");
                AuthError::Forbidden
            })?;

        let credential = self.gate.codec().store().login(&subject_id).await?;
        let session = self.open_session(&credential).await?;
        info!(subject_id = %subject_id, "Subject logged in");
        Ok(session)
    }

    /// Rotate the refresh lineage and issue a fresh token pair.
    ///
    /// The presented refresh token is single-use: its generation is replaced
    /// before new tokens are minted.
    #[instrument(skip_all)]
    pub async fn refresh(&self, cookie_header: Option<&str>) -> Result<Session, AuthError> {
        let token = cookie_header
            .and_then(|h| read_cookie(h, REFRESH_COOKIE))
            .ok_or(AuthError::Unauthenticated)?;
        let principal = self
            .gate
            .authorize_token(token, Endpoint::Refresh, None)
            .await?;

        let credential = self
            .gate
            .codec()
            .store()
            .rotate_refresh_uid(&principal.subject_id)
            .await?;
        let session = self.open_session(&credential).await?;
        info!(subject_id = %principal.subject_id, "Tokens refreshed");
        Ok(session)
    }

    /// End the refresh lineage. Returns the cookie-clearing `Set-Cookie` value.
    #[instrument(skip_all)]
    pub async fn logout(&self, cookie_header: Option<&str>) -> Result<String, AuthError> {
        let token = cookie_header
            .and_then(|h| read_cookie(h, REFRESH_COOKIE))
            .ok_or(AuthError::Unauthenticated)?;
        let principal = self
            .gate
            .authorize_token(token, Endpoint::Refresh, None)
            .await?;

        self.gate
            .codec()
            .store()
            .revoke(&principal.subject_id)
            .await?;
        info!(subject_id = %principal.subject_id, "Subject logged out");
        Ok(expired_refresh_cookie())
    }

    /// Report whether the caller's login is still alive.
    pub async fn touch(&self, principal: &Principal) -> Result<TouchStatus, AuthError> {
        if principal.kind != PrincipalKind::Access {
            return Ok(TouchStatus::Ok);
        }
        let credential = self
            .gate
            .codec()
            .store()
            .get(&principal.subject_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        Ok(if credential.is_logged_out() {
            TouchStatus::LoggedOut
        } else {
            TouchStatus::Ok
        })
    }

    pub fn whoami(&self, principal: &Principal) -> WhoAmI {
        WhoAmI {
            subject_id: principal.subject_id.clone(),
            scopes: principal.scopes.clone(),
            audience: principal.audience(),
        }
    }

    /// Provision a static token for a service.
    ///
    /// Requested scopes are filtered to the static-token list and must all be
    /// held by the caller.
    #[instrument(skip(self, principal, request), fields(subject_id = %principal.subject_id))]
    pub async fn issue_static_token(
        &self,
        principal: &Principal,
        request: StaticTokenRequest,
    ) -> Result<StaticTokenIssued, AuthError> {
        require_token_admin(principal)?;

        let scopes = retain_valid_static_scopes(&request.scopes);
        if scopes.is_empty() {
            return Err(AuthError::BadRequest("no valid scopes requested".into()));
        }
        if let Some(missing) = scopes.iter().find(|s| !principal.has_scope(s)) {
            warn!(scope = %missing, "Static token would exceed caller's scopes");
            return Err(AuthError::Forbidden);
        }
        let ttl_secs = match request.ttl_secs {
            Some(ttl) if ttl <= 0 => {
                return Err(AuthError::BadRequest("ttl_secs must be positive".into()));
            }
            Some(ttl) => ttl,
            None => self.static_ttl_secs,
        };

        let store = self.gate.codec().store();
        let record = store
            .create_static_token(
                &principal.subject_id,
                &join_scopes(&scopes),
                request.purpose.trim(),
                ttl_secs,
            )
            .await?;
        let issued = self.gate.codec().issue_static(&record)?;

        info!(token_id = %record.id, scopes = %record.scopes, "Static token issued");
        Ok(StaticTokenIssued {
            id: record.id,
            token: issued.token,
            scopes,
            expires_at: issued.expires_at,
        })
    }

    /// Revoke a static token. Returns `false` when it does not exist.
    #[instrument(skip(self, principal), fields(subject_id = %principal.subject_id))]
    pub async fn revoke_static_token(
        &self,
        principal: &Principal,
        token_id: &str,
    ) -> Result<bool, AuthError> {
        require_token_admin(principal)?;
        let revoked = self
            .gate
            .codec()
            .store()
            .revoke_static_token(token_id)
            .await?;
        if revoked {
            info!(token_id, "Static token revoked");
        }
        Ok(revoked)
    }

    /// Compute live scopes and mint the access/refresh pair.
    async fn open_session(&self, credential: &Credential) -> Result<Session, AuthError> {
        let scopes = self
            .identity
            .scopes_for(&credential.subject_id)
            .await
            .map_err(|e| match e {
                IdentityError::Rejected(_) => AuthError::Forbidden,
                other => AuthError::Internal(other.to_string()),
            })?;
        if scopes.is_empty() {
            warn!(subject_id = %credential.subject_id, "No scopes for subject");
            return Err(AuthError::Forbidden);
        }

        let codec = self.gate.codec();
        let access = codec.issue_access(credential, &scopes)?;
        let refresh = codec.issue_refresh(credential)?;
        Ok(Session {
            subject_id: credential.subject_id.clone(),
            access,
            refresh_cookie: refresh_cookie(&refresh.token, codec.refresh_ttl_secs()),
        })
    }
}

fn require_token_admin(principal: &Principal) -> Result<(), AuthError> {
    if principal.kind != PrincipalKind::Access {
        return Err(AuthError::Unauthenticated);
    }
    if !principal.has_scope(TOKEN_ADMIN_SCOPE) {
        return Err(AuthError::Forbidden);
    }
    Ok(())
}
