//! JWT claims for Herald tokens.

use serde::{Deserialize, Serialize};

use herald_core::scopes::parse_scopes;

/// Which kind of token a set of claims belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Access,
    Refresh,
    Static,
}

impl Audience {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Static => "static",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims embedded in every Herald token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer (the configured bot identity).
    pub iss: String,
    /// Subject id. For static tokens, the creator.
    pub sub: String,
    pub aud: Audience,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
    /// Refresh generation for refresh tokens, token id for static tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Space-delimited granted scopes.
    #[serde(default)]
    pub scopes: String,
}

impl Claims {
    pub fn scope_list(&self) -> Vec<String> {
        parse_scopes(&self.scopes)
    }
}
