//! Discord channel announcements via the bot REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use herald_core::config::DiscordConfig;

use super::{Announcement, DISCORD, PostReference, PublishError, Publisher, check};

#[derive(Debug, Serialize)]
pub struct CreateMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub image: EmbedImage,
}

#[derive(Debug, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
}

#[derive(Debug)]
pub struct DiscordPublisher {
    http: reqwest::Client,
    config: DiscordConfig,
}

impl DiscordPublisher {
    pub const fn new(config: DiscordConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    /// The link is wrapped in `<>` so only the preview embed is shown.
    pub fn build_message(announcement: &Announcement) -> CreateMessage {
        let url = format!("<{}>", announcement.url);
        CreateMessage {
            content: announcement.message(&announcement.streamer, &url, &[]),
            embeds: vec![Embed {
                title: announcement.alt_text(),
                url: announcement.url.clone(),
                image: EmbedImage {
                    url: announcement.thumbnail_url.clone(),
                },
            }],
        }
    }

    fn message_url(&self, message_id: &str) -> String {
        let guild = if self.config.guild_id.is_empty() {
            "@me"
        } else {
            self.config.guild_id.as_str()
        };
        format!(
            "https://discord.com/channels/{guild}/{}/{message_id}",
            self.config.channel_id
        )
    }
}

#[async_trait]
impl Publisher for DiscordPublisher {
    fn platform(&self) -> &'static str {
        DISCORD
    }

    #[instrument(skip_all, fields(channel_id = %self.config.channel_id))]
    async fn publish(&self, announcement: &Announcement) -> Result<PostReference, PublishError> {
        let url = format!(
            "{}/channels/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.channel_id
        );
        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Bot {}", self.config.bot_token))
            .json(&Self::build_message(announcement))
            .send()
            .await?;

        let message: Message = check(DISCORD, response).await?.json().await?;
        debug!(message_id = %message.id, "Discord message sent");

        Ok(PostReference {
            platform: DISCORD.to_string(),
            post_url: self.message_url(&message.id),
            post_id: message.id,
        })
    }
}
