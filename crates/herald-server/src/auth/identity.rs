//! Upstream identity provider used for login and live scope computation.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use herald_core::config::DiscordConfig;

use crate::http::form_body;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider refused the code or the subject.
    #[error("Identity rejected: {0}")]
    Rejected(String),

    #[error("Identity request error: {0}")]
    Request(String),

    #[error("Identity API error (status {status}): {body}")]
    ApiError { status: u16, body: String },
}

/// Resolves login codes to subjects and subjects to scopes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an OAuth authorization code for the subject id it belongs to.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, IdentityError>;

    /// Compute the subject's current scopes. Empty means no access.
    async fn scopes_for(&self, subject_id: &str) -> Result<Vec<String>, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    roles: Vec<String>,
}

/// Discord OAuth login with scopes derived from guild membership and roles.
#[derive(Debug, Clone)]
pub struct DiscordIdentity {
    http: reqwest::Client,
    config: DiscordConfig,
}

impl DiscordIdentity {
    pub const fn new(config: DiscordConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        warn!(status = status.as_u16(), body = %body, "Discord API returned error");
        Err(IdentityError::ApiError {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IdentityProvider for DiscordIdentity {
    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, IdentityError> {
        let body = form_body(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ]);
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.config.api_base))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;
        let token: TokenResponse = Self::check(response)
            .await
            .map_err(|e| IdentityError::Rejected(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        let response = self
            .http
            .get(format!("{}/users/@me", self.config.api_base))
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;
        let user: DiscordUser = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        if user.id.is_empty() {
            return Err(IdentityError::Rejected("empty user id".into()));
        }
        debug!(subject_id = %user.id, "Discord code exchanged");
        Ok(user.id)
    }

    #[instrument(skip(self))]
    async fn scopes_for(&self, subject_id: &str) -> Result<Vec<String>, IdentityError> {
        let response = self
            .http
            .get(format!(
                "{}/guilds/{}/members/{}",
                self.config.api_base, self.config.guild_id, subject_id
            ))
            .header("authorization", format!("Bot {}", self.config.bot_token))
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(subject_id, "Not a guild member");
            return Ok(Vec::new());
        }
        let member: GuildMember = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        Ok(scopes_from_roles(&member.roles, &self.config))
    }
}

/// Map guild roles to Herald scopes. Membership alone grants `login`.
pub fn scopes_from_roles(roles: &[String], config: &DiscordConfig) -> Vec<String> {
    let has = |role: &str| !role.is_empty() && roles.iter().any(|r| r == role);

    let mut scopes = vec!["login".to_string()];
    if has(&config.admin_role) {
        scopes.push("admin".to_string());
    }
    if has(&config.dev_role) {
        scopes.push("dev".to_string());
    }
    if has(&config.streamer_role) {
        scopes.push("gsg".to_string());
    }
    scopes
}
