//! Data models for Herald storage.

use serde::{Deserialize, Serialize};

use herald_core::db::{DatabaseError, decode_string_list};
use herald_crypto::SealedSecret;

/// Marker prefixed to a revoked credential's refresh generation.
pub const REVOKED_MARKER: &str = "REVOKED";

/// A subject's signing credential as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credential {
    pub subject_id: String,
    pub secret_ciphertext: String,
    pub secret_nonce: String,
    pub refresh_uid: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Credential {
    pub fn sealed_secret(&self) -> SealedSecret {
        SealedSecret {
            ciphertext: self.secret_ciphertext.clone(),
            nonce: self.secret_nonce.clone(),
        }
    }

    /// Whether the refresh lineage was ended by logout.
    pub fn is_logged_out(&self) -> bool {
        self.refresh_uid.contains(REVOKED_MARKER)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StaticToken {
    pub id: String,
    pub creator_id: String,
    /// Space-delimited.
    pub scopes: String,
    pub purpose: String,
    #[serde(skip)]
    pub secret_ciphertext: String,
    #[serde(skip)]
    pub secret_nonce: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub revoked: bool,
}

impl StaticToken {
    pub fn sealed_secret(&self) -> SealedSecret {
        SealedSecret {
            ciphertext: self.secret_ciphertext.clone(),
            nonce: self.secret_nonce.clone(),
        }
    }
}

/// One delivered webhook message; written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventsubMessage {
    pub id: String,
    pub message_timestamp: String,
    pub message_type: String,
    pub retry_count: i64,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StreamRow {
    pub id: String,
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String,
    pub title: String,
    pub category_id: String,
    pub category_name: String,
    pub tags: String,
    pub thumbnail_url: String,
    pub started_at: String,
    pub ended_at: i64,
    pub discord_post_id: String,
    pub discord_post_url: String,
    pub mastodon_post_id: String,
    pub mastodon_post_url: String,
    pub bluesky_post_id: String,
    pub bluesky_post_url: String,
    pub filtered: bool,
}

/// A single broadcast, keyed by the upstream broadcast id.
///
/// `ended_at == 0` means the stream is live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: String,
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String,
    pub title: String,
    pub category_id: String,
    pub category_name: String,
    pub tags: Vec<String>,
    pub thumbnail_url: String,
    /// RFC 3339 text as delivered upstream.
    pub started_at: String,
    pub ended_at: i64,
    pub discord_post_id: String,
    pub discord_post_url: String,
    pub mastodon_post_id: String,
    pub mastodon_post_url: String,
    pub bluesky_post_id: String,
    pub bluesky_post_url: String,
    pub filtered: bool,
}

impl StreamRecord {
    pub const fn is_live(&self) -> bool {
        self.ended_at == 0
    }

    /// Public URL of the channel.
    pub fn stream_url(&self) -> String {
        format!("https://twitch.tv/{}", self.broadcaster_login)
    }
}

impl TryFrom<StreamRow> for StreamRecord {
    type Error = DatabaseError;

    fn try_from(row: StreamRow) -> Result<Self, Self::Error> {
        Ok(Self {
            tags: decode_string_list(&row.tags)?,
            id: row.id,
            broadcaster_id: row.broadcaster_id,
            broadcaster_login: row.broadcaster_login,
            broadcaster_name: row.broadcaster_name,
            title: row.title,
            category_id: row.category_id,
            category_name: row.category_name,
            thumbnail_url: row.thumbnail_url,
            started_at: row.started_at,
            ended_at: row.ended_at,
            discord_post_id: row.discord_post_id,
            discord_post_url: row.discord_post_url,
            mastodon_post_id: row.mastodon_post_id,
            mastodon_post_url: row.mastodon_post_url,
            bluesky_post_id: row.bluesky_post_id,
            bluesky_post_url: row.bluesky_post_url,
            filtered: row.filtered,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackedUser {
    pub broadcaster_id: String,
    pub login: String,
    pub display_name: String,
    pub active: bool,
    /// Mastodon account (`user@instance`) used to mention the streamer.
    pub mastodon_handle: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CategoryRow {
    pub name: String,
    pub mastodon_tags: String,
    pub bluesky_tags: String,
}

/// An allow-listed category and the hashtags appended per platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub mastodon_tags: Vec<String>,
    pub bluesky_tags: Vec<String>,
}

impl TryFrom<CategoryRow> for CategoryRule {
    type Error = DatabaseError;

    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            mastodon_tags: decode_string_list(&row.mastodon_tags)?,
            bluesky_tags: decode_string_list(&row.bluesky_tags)?,
            name: row.name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FilterRule {
    pub id: i64,
    pub keyword: String,
    pub is_regex: bool,
    pub case_insensitive: bool,
}
