//! Configuration resolution for Herald.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. Optional JSON config file
//! 3. Environment variables (`HERALD_*`)
//!
//! The resolved configuration is validated once at startup and then passed
//! explicitly to every component.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Complete Herald configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeraldConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub eventsub: EventsubConfig,
    #[serde(default)]
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub bluesky: BlueskyConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Bot identity and operator access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Token issuer and expected `iss` claim.
    pub identity: String,
    /// Static operator bearer accepted on standard endpoints.
    pub operator_token: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            identity: "herald".to_string(),
            operator_token: None,
        }
    }
}

/// Token lifetimes and at-rest secret sealing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Default lifetime of a static token when the request names none.
    pub static_ttl_secs: i64,
    /// Hex-encoded 32-byte key used to seal per-subject signing secrets.
    pub sealing_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: 10 * 60,
            refresh_ttl_secs: 14 * 24 * 60 * 60, // 2 weeks
            static_ttl_secs: 365 * 24 * 60 * 60,
            sealing_key: String::new(),
        }
    }
}

/// Webhook intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsubConfig {
    pub webhook_secret: String,
    /// A stream that restarts within this window after ending is treated as
    /// the same broadcast.
    pub debounce_secs: i64,
}

impl Default for EventsubConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            debounce_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub auth_base: String,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base: "https://api.twitch.tv".to_string(),
            auth_base: "https://id.twitch.tv".to_string(),
        }
    }
}

/// Discord covers both the login identity provider and the announcement channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub guild_id: String,
    pub admin_role: String,
    pub dev_role: String,
    pub streamer_role: String,
    pub bot_token: String,
    pub channel_id: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v10".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            guild_id: String::new(),
            admin_role: String::new(),
            dev_role: String::new(),
            streamer_role: String::new(),
            bot_token: String::new(),
            channel_id: String::new(),
        }
    }
}

impl DiscordConfig {
    /// Whether announcements should be posted to a channel.
    pub fn publishing_enabled(&self) -> bool {
        !self.bot_token.is_empty() && !self.channel_id.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MastodonConfig {
    pub instance_url: String,
    pub access_token: String,
    pub visibility: String,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            access_token: String::new(),
            visibility: "public".to_string(),
        }
    }
}

impl MastodonConfig {
    pub fn publishing_enabled(&self) -> bool {
        !self.instance_url.is_empty() && !self.access_token.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    pub service_url: String,
    pub handle: String,
    pub app_password: String,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: "https://bsky.social".to_string(),
            handle: String::new(),
            app_password: String::new(),
        }
    }
}

impl BlueskyConfig {
    pub fn publishing_enabled(&self) -> bool {
        !self.handle.is_empty() && !self.app_password.is_empty()
    }
}

/// Outbound and inbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            cors_origins: Vec::new(),
        }
    }
}

impl HeraldConfig {
    /// Load configuration from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_config_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `HERALD_*` overrides using the given variable lookup.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_overrides = [
            ("HERALD_BOT_IDENTITY", &mut self.bot.identity),
            ("HERALD_SEALING_KEY", &mut self.auth.sealing_key),
            ("HERALD_WEBHOOK_SECRET", &mut self.eventsub.webhook_secret),
            ("HERALD_TWITCH_CLIENT_ID", &mut self.twitch.client_id),
            ("HERALD_TWITCH_CLIENT_SECRET", &mut self.twitch.client_secret),
            ("HERALD_DISCORD_CLIENT_ID", &mut self.discord.client_id),
            ("HERALD_DISCORD_CLIENT_SECRET", &mut self.discord.client_secret),
            ("HERALD_DISCORD_REDIRECT_URI", &mut self.discord.redirect_uri),
            ("HERALD_DISCORD_GUILD_ID", &mut self.discord.guild_id),
            ("HERALD_DISCORD_ADMIN_ROLE", &mut self.discord.admin_role),
            ("HERALD_DISCORD_DEV_ROLE", &mut self.discord.dev_role),
            ("HERALD_DISCORD_STREAMER_ROLE", &mut self.discord.streamer_role),
            ("HERALD_DISCORD_BOT_TOKEN", &mut self.discord.bot_token),
            ("HERALD_DISCORD_CHANNEL_ID", &mut self.discord.channel_id),
            ("HERALD_MASTODON_URL", &mut self.mastodon.instance_url),
            ("HERALD_MASTODON_TOKEN", &mut self.mastodon.access_token),
            ("HERALD_MASTODON_VISIBILITY", &mut self.mastodon.visibility),
            ("HERALD_BLUESKY_HANDLE", &mut self.bluesky.handle),
            ("HERALD_BLUESKY_APP_PASSWORD", &mut self.bluesky.app_password),
        ];
        for (key, slot) in string_overrides {
            if let Some(val) = lookup(key) {
                *slot = val;
            }
        }

        if let Some(val) = lookup("HERALD_OPERATOR_TOKEN") {
            self.bot.operator_token = Some(val).filter(|v| !v.is_empty());
        }
        if let Some(n) = lookup("HERALD_DEBOUNCE_SECS").and_then(|v| v.parse().ok()) {
            self.eventsub.debounce_secs = n;
        }
        if let Some(n) = lookup("HERALD_ACCESS_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.auth.access_ttl_secs = n;
        }
        if let Some(n) = lookup("HERALD_REFRESH_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.auth.refresh_ttl_secs = n;
        }
        if let Some(n) = lookup("HERALD_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.http.request_timeout_secs = n;
        }
        if let Some(val) = lookup("HERALD_CORS_ORIGINS") {
            self.http.cors_origins = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bot.identity.trim().is_empty() {
            return Err(Error::Config("bot.identity must not be empty".into()));
        }
        if self.eventsub.webhook_secret.is_empty() {
            return Err(Error::Config("eventsub.webhook_secret must be set".into()));
        }
        if self.eventsub.debounce_secs < 0 {
            return Err(Error::Config("eventsub.debounce_secs must not be negative".into()));
        }
        if self.auth.access_ttl_secs <= 0
            || self.auth.refresh_ttl_secs <= 0
            || self.auth.static_ttl_secs <= 0
        {
            return Err(Error::Config("token lifetimes must be positive".into()));
        }
        let key = &self.auth.sealing_key;
        if key.len() != 64 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Config(
                "auth.sealing_key must be 64 hex characters (32 bytes)".into(),
            ));
        }
        if self.http.request_timeout_secs == 0 {
            return Err(Error::Config("http.request_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

fn load_config_file(path: &Path) -> Result<HeraldConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}
