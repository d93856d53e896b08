//! Request authorization gate.
//!
//! Resolves an `Authorization` header (or a raw token) into a [`Principal`]
//! for a given endpoint class and required scope.

use tracing::debug;

use herald_core::scopes::match_scope;
use herald_crypto::constant_time_str_eq;

use super::AuthError;
use super::claims::Audience;
use super::codec::{KeyOwner, TokenCodec};

/// Endpoint classes, each accepting a different set of token audiences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Ordinary API calls: access or static tokens, or the operator bearer.
    Standard,
    /// Static-token management: access tokens only.
    TokenManagement,
    /// Token refresh: refresh tokens only.
    Refresh,
}

impl Endpoint {
    pub const fn accepted_audiences(self) -> &'static [Audience] {
        match self {
            Self::Standard => &[Audience::Access, Audience::Static],
            Self::TokenManagement => &[Audience::Access],
            Self::Refresh => &[Audience::Refresh],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalKind {
    /// The configured operator bearer.
    Operator,
    Access,
    Refresh,
    Static { token_id: String },
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject_id: String,
    pub scopes: Vec<String>,
    pub kind: PrincipalKind,
}

impl Principal {
    /// The operator holds every scope.
    pub fn has_scope(&self, required: &str) -> bool {
        self.kind == PrincipalKind::Operator || match_scope(&self.scopes, required)
    }

    pub const fn audience(&self) -> &'static str {
        match self.kind {
            PrincipalKind::Operator => "operator",
            PrincipalKind::Access => "access",
            PrincipalKind::Refresh => "refresh",
            PrincipalKind::Static { .. } => "static",
        }
    }
}

#[derive(Clone)]
pub struct AuthGate {
    codec: TokenCodec,
    operator_token: Option<String>,
}

impl AuthGate {
    pub fn new(codec: TokenCodec, operator_token: Option<String>) -> Self {
        Self {
            codec,
            operator_token: operator_token.filter(|t| !t.is_empty()),
        }
    }

    pub const fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Authorize a request from its `Authorization` header.
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
        endpoint: Endpoint,
        required_scope: Option<&str>,
    ) -> Result<Principal, AuthError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::Unauthenticated)?;
        self.authorize_token(token, endpoint, required_scope).await
    }

    /// Authorize a raw token.
    pub async fn authorize_token(
        &self,
        token: &str,
        endpoint: Endpoint,
        required_scope: Option<&str>,
    ) -> Result<Principal, AuthError> {
        if let Some(operator) = &self.operator_token {
            if constant_time_str_eq(operator, token) {
                if endpoint != Endpoint::Standard {
                    debug!(?endpoint, "Operator bearer refused");
                    return Err(AuthError::Unauthenticated);
                }
                return Ok(Principal {
                    subject_id: "operator".to_string(),
                    scopes: Vec::new(),
                    kind: PrincipalKind::Operator,
                });
            }
        }

        let verified = self
            .codec
            .verify(token, endpoint.accepted_audiences())
            .await?;
        let kind = match (&verified.owner, verified.claims.aud) {
            (KeyOwner::Static(record), _) => PrincipalKind::Static {
                token_id: record.id.clone(),
            },
            (KeyOwner::Credential(_), Audience::Refresh) => PrincipalKind::Refresh,
            (KeyOwner::Credential(_), _) => PrincipalKind::Access,
        };
        let principal = Principal {
            scopes: verified.claims.scope_list(),
            subject_id: verified.claims.sub,
            kind,
        };

        if let Some(scope) = required_scope {
            if !principal.has_scope(scope) {
                debug!(subject_id = %principal.subject_id, scope, "Missing scope");
                return Err(AuthError::Forbidden);
            }
        }
        Ok(principal)
    }
}

/// Extract the token from `Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
