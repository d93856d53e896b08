//! Bluesky posts through the AT Protocol XRPC endpoints.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use herald_core::config::BlueskyConfig;

use super::{Announcement, BLUESKY, PostReference, PublishError, Publisher, check};

const POST_COLLECTION: &str = "app.bsky.feed.post";

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"https?://[A-Za-z0-9._\-/]+").ok());
static HASHTAG_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z0-9](?:[^ \n]*[A-Za-z0-9])?)").ok());

#[derive(Debug, Serialize)]
struct CreateSession<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    uri: String,
    #[serde(default)]
    cid: String,
}

/// Rich-text annotations over byte ranges of the post text.
pub fn facets(text: &str) -> Vec<serde_json::Value> {
    let mut facets = Vec::new();

    if let Some(re) = URL_PATTERN.as_ref() {
        for m in re.find_iter(text) {
            facets.push(json!({
                "index": {"byteStart": m.start(), "byteEnd": m.end()},
                "features": [{"$type": "app.bsky.richtext.facet#link", "uri": m.as_str()}],
            }));
        }
    }

    if let Some(re) = HASHTAG_PATTERN.as_ref() {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(tag)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            facets.push(json!({
                "index": {"byteStart": whole.start(), "byteEnd": whole.end()},
                "features": [{"$type": "app.bsky.richtext.facet#tag", "tag": tag.as_str()}],
            }));
        }
    }

    facets
}

/// Browser URL for an `at://<did>/app.bsky.feed.post/<rkey>` record.
pub fn web_url(at_uri: &str) -> Option<String> {
    let rest = at_uri.strip_prefix("at://")?;
    let mut parts = rest.splitn(3, '/');
    let (did, collection, rkey) = (parts.next()?, parts.next()?, parts.next()?);
    (collection == POST_COLLECTION && !rkey.is_empty())
        .then(|| format!("https://bsky.app/profile/{did}/post/{rkey}"))
}

#[derive(Debug)]
pub struct BlueskyPublisher {
    http: reqwest::Client,
    config: BlueskyConfig,
}

impl BlueskyPublisher {
    pub const fn new(config: BlueskyConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    fn xrpc(&self, method: &str) -> String {
        format!(
            "{}/xrpc/{method}",
            self.config.service_url.trim_end_matches('/')
        )
    }

    /// The `app.bsky.feed.post` record for `announcement`.
    pub fn build_record(announcement: &Announcement, created_at: &str) -> serde_json::Value {
        let text = announcement.message(
            &announcement.streamer,
            &announcement.url,
            &announcement.bluesky_tags,
        );
        json!({
            "$type": POST_COLLECTION,
            "text": text,
            "createdAt": created_at,
            "facets": facets(&text),
            "embed": {
                "$type": "app.bsky.embed.external",
                "external": {
                    "uri": announcement.url,
                    "title": announcement.title,
                    "description": announcement.alt_text(),
                },
            },
        })
    }

    async fn login(&self) -> Result<Session, PublishError> {
        let response = self
            .http
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&CreateSession {
                identifier: &self.config.handle,
                password: &self.config.app_password,
            })
            .send()
            .await?;
        Ok(check(BLUESKY, response).await?.json().await?)
    }
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    fn platform(&self) -> &'static str {
        BLUESKY
    }

    #[instrument(skip_all, fields(handle = %self.config.handle))]
    async fn publish(&self, announcement: &Announcement) -> Result<PostReference, PublishError> {
        let session = self.login().await?;
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let response = self
            .http
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": POST_COLLECTION,
                "record": Self::build_record(announcement, &created_at),
            }))
            .send()
            .await?;

        let record: CreatedRecord = check(BLUESKY, response).await?.json().await?;
        debug!(uri = %record.uri, cid = %record.cid, "Bluesky post created");

        Ok(PostReference {
            platform: BLUESKY.to_string(),
            post_url: web_url(&record.uri).unwrap_or_else(|| record.uri.clone()),
            post_id: record.uri,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn facets_cover_links_and_tags_by_byte_offset() {
        let text = "Café is live: https://twitch.tv/cafe\n\n#music #a";
        let facets = facets(text);
        assert_eq!(facets.len(), 3);

        let link = &facets[0];
        let start = link["index"]["byteStart"].as_u64().unwrap() as usize;
        let end = link["index"]["byteEnd"].as_u64().unwrap() as usize;
        assert_eq!(&text[start..end], "https://twitch.tv/cafe");
        assert_eq!(link["features"][0]["uri"], "https://twitch.tv/cafe");

        assert_eq!(facets[1]["features"][0]["tag"], "music");
        assert_eq!(facets[2]["features"][0]["tag"], "a");
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_tag() {
        let facets = facets("#speedrun!");
        assert_eq!(facets[0]["features"][0]["tag"], "speedrun");
        assert_eq!(facets[0]["index"]["byteEnd"], 9);
    }

    #[test]
    fn record_has_text_embed_and_timestamp() {
        let announcement = Announcement {
            streamer: "Shrimp".to_string(),
            category: "Music".to_string(),
            title: "Synth night".to_string(),
            url: "https://twitch.tv/shrimp".to_string(),
            bluesky_tags: vec!["#music".to_string()],
            ..Announcement::default()
        };
        let record = BlueskyPublisher::build_record(&announcement, "2024-05-01T10:00:00.000Z");
        assert_eq!(
            record["text"],
            "Shrimp is now streaming Music on Twitch: https://twitch.tv/shrimp\n\nSynth night\n\n#music"
        );
        assert_eq!(record["createdAt"], "2024-05-01T10:00:00.000Z");
        assert_eq!(record["embed"]["external"]["uri"], "https://twitch.tv/shrimp");
        assert_eq!(record["facets"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn at_uri_maps_to_web_url() {
        assert_eq!(
            web_url("at://did:plc:abc/app.bsky.feed.post/3k2l").as_deref(),
            Some("https://bsky.app/profile/did:plc:abc/post/3k2l")
        );
        assert_eq!(web_url("at://did:plc:abc/app.bsky.feed.like/3k2l"), None);
        assert_eq!(web_url("https://bsky.app"), None);
    }
}
