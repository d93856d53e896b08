//! Concurrent announcement fanout to social platforms.
//!
//! Each destination implements [`Publisher`]. [`FanoutPublisher`] runs all of
//! them at once and keeps whatever succeeded.

pub mod bluesky;
pub mod discord;
pub mod mastodon;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::storage::{CategoryRule, StreamRecord, TrackedUser};

pub use bluesky::BlueskyPublisher;
pub use discord::DiscordPublisher;
pub use mastodon::MastodonPublisher;

pub const DISCORD: &str = "discord";
pub const MASTODON: &str = "mastodon";
pub const BLUESKY: &str = "bluesky";

const THUMBNAIL_WIDTH: &str = "1280";
const THUMBNAIL_HEIGHT: &str = "720";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish request error: {0}")]
    Request(String),

    #[error("Publish API error (status {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Publish response error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Turn a non-2xx response into [`PublishError::ApiError`].
pub(crate) async fn check(
    platform: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    warn!(platform, status = status.as_u16(), body = %body, "Platform API returned error");
    Err(PublishError::ApiError {
        status: status.as_u16(),
        body,
    })
}

/// Where an announcement landed on one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReference {
    pub platform: String,
    pub post_id: String,
    pub post_url: String,
}

/// Everything a publisher needs to describe a stream going live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Announcement {
    pub stream_id: String,
    pub streamer: String,
    pub login: String,
    /// `user@instance`, empty when unknown.
    pub mastodon_handle: String,
    pub category: String,
    pub title: String,
    pub url: String,
    /// Preview image with the size placeholders filled in.
    pub thumbnail_url: String,
    pub tags: Vec<String>,
    pub mastodon_tags: Vec<String>,
    pub bluesky_tags: Vec<String>,
}

impl Announcement {
    pub fn new(stream: &StreamRecord, user: &TrackedUser, category: &CategoryRule) -> Self {
        let streamer = if stream.broadcaster_name.is_empty() {
            user.display_name.clone()
        } else {
            stream.broadcaster_name.clone()
        };
        Self {
            stream_id: stream.id.clone(),
            streamer,
            login: stream.broadcaster_login.clone(),
            mastodon_handle: user.mastodon_handle.trim_start_matches('@').to_string(),
            category: stream.category_name.clone(),
            title: stream.title.clone(),
            url: stream.stream_url(),
            thumbnail_url: stream
                .thumbnail_url
                .replace("{width}", THUMBNAIL_WIDTH)
                .replace("{height}", THUMBNAIL_HEIGHT),
            tags: stream.tags.clone(),
            mastodon_tags: category.mastodon_tags.clone(),
            bluesky_tags: category.bluesky_tags.clone(),
        }
    }

    /// The shared post layout. The hashtag section is omitted when empty.
    pub fn message(&self, streamer: &str, url: &str, hashtags: &[String]) -> String {
        let mut text = format!(
            "{streamer} is now streaming {} on Twitch: {url}\n\n{}",
            self.category, self.title
        );
        if !hashtags.is_empty() {
            text.push_str("\n\n");
            text.push_str(&hashtags.join(" "));
        }
        text
    }

    pub fn alt_text(&self) -> String {
        format!("Preview of {}'s stream on Twitch.", self.streamer)
    }
}

/// One social destination.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name matched against the record's per-platform columns.
    fn platform(&self) -> &'static str;

    async fn publish(&self, announcement: &Announcement) -> Result<PostReference, PublishError>;
}

/// Results gathered from every destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutOutcome {
    pub posted: Vec<PostReference>,
    pub failed: Vec<String>,
}

impl FanoutOutcome {
    /// Copy post references into `record`; unknown platforms are ignored.
    pub fn apply_to(&self, record: &mut StreamRecord) {
        for post in &self.posted {
            let (id, url) = match post.platform.as_str() {
                DISCORD => (&mut record.discord_post_id, &mut record.discord_post_url),
                MASTODON => (&mut record.mastodon_post_id, &mut record.mastodon_post_url),
                BLUESKY => (&mut record.bluesky_post_id, &mut record.bluesky_post_url),
                _ => continue,
            };
            id.clone_from(&post.post_id);
            url.clone_from(&post.post_url);
        }
    }
}

/// Runs every configured publisher concurrently.
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn Publisher>>,
}

impl FanoutPublisher {
    pub fn new(publishers: Vec<Arc<dyn Publisher>>) -> Self {
        Self { publishers }
    }

    pub fn platforms(&self) -> Vec<&'static str> {
        self.publishers.iter().map(|p| p.platform()).collect()
    }

    /// Publish to all destinations and wait for each to finish.
    ///
    /// A failing or panicking publisher is recorded in `failed`; the others
    /// are unaffected.
    #[instrument(skip_all, fields(stream_id = %announcement.stream_id))]
    pub async fn publish(&self, announcement: Arc<Announcement>) -> FanoutOutcome {
        let mut tasks = JoinSet::new();
        let mut platforms = HashMap::with_capacity(self.publishers.len());

        for publisher in &self.publishers {
            let publisher = Arc::clone(publisher);
            let announcement = Arc::clone(&announcement);
            let platform = publisher.platform();
            let handle = tasks.spawn(async move { publisher.publish(&announcement).await });
            platforms.insert(handle.id(), platform);
        }

        let mut outcome = FanoutOutcome::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(post))) => {
                    info!(platform = %post.platform, post_id = %post.post_id, "Announcement posted");
                    outcome.posted.push(post);
                }
                Ok((id, Err(e))) => {
                    let platform = platforms.get(&id).copied().unwrap_or("unknown");
                    warn!(platform, error = %e, "Announcement failed");
                    outcome.failed.push(platform.to_string());
                }
                Err(e) => {
                    let platform = platforms.get(&e.id()).copied().unwrap_or("unknown");
                    warn!(platform, error = %e, "Publisher task aborted");
                    outcome.failed.push(platform.to_string());
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests;
