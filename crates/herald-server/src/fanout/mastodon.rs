//! Mastodon status posts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use herald_core::config::MastodonConfig;

use super::{Announcement, MASTODON, PostReference, PublishError, Publisher, check};

#[derive(Debug, Serialize)]
pub struct NewStatus {
    pub status: String,
    pub visibility: String,
    pub sensitive: bool,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    uri: String,
}

#[derive(Debug)]
pub struct MastodonPublisher {
    http: reqwest::Client,
    config: MastodonConfig,
}

impl MastodonPublisher {
    pub const fn new(config: MastodonConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    /// Mentions the streamer when their account is known.
    pub fn build_status(&self, announcement: &Announcement) -> NewStatus {
        let streamer = if announcement.mastodon_handle.is_empty() {
            announcement.streamer.clone()
        } else {
            format!("@{}", announcement.mastodon_handle)
        };
        NewStatus {
            status: announcement.message(&streamer, &announcement.url, &announcement.mastodon_tags),
            visibility: self.config.visibility.clone(),
            sensitive: false,
        }
    }
}

#[async_trait]
impl Publisher for MastodonPublisher {
    fn platform(&self) -> &'static str {
        MASTODON
    }

    #[instrument(skip_all, fields(instance = %self.config.instance_url))]
    async fn publish(&self, announcement: &Announcement) -> Result<PostReference, PublishError> {
        let url = format!(
            "{}/api/v1/statuses",
            self.config.instance_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.access_token)
            // Same stream id within the server's idempotency window posts once.
            .header("Idempotency-Key", &announcement.stream_id)
            .json(&self.build_status(announcement))
            .send()
            .await?;

        let status: Status = check(MASTODON, response).await?.json().await?;
        debug!(status_id = %status.id, "Mastodon status posted");

        Ok(PostReference {
            platform: MASTODON.to_string(),
            post_url: status.url.unwrap_or(status.uri),
            post_id: status.id,
        })
    }
}
