//! Canonical stream metadata from the streaming platform's API.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use herald_core::config::TwitchConfig;

use crate::http::form_body;
use crate::storage::StreamRecord;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream request error: {0}")]
    Request(String),

    #[error("Upstream API error (status {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Upstream response error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// A live broadcast as reported upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpstreamStream {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub thumbnail_url: String,
}

impl UpstreamStream {
    /// A fresh live record for this broadcast.
    pub fn to_record(&self) -> StreamRecord {
        StreamRecord {
            id: self.id.clone(),
            broadcaster_id: self.user_id.clone(),
            broadcaster_login: self.user_login.clone(),
            broadcaster_name: self.user_name.clone(),
            title: self.title.clone(),
            category_id: self.game_id.clone(),
            category_name: self.game_name.clone(),
            tags: self.tags.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            started_at: self.started_at.clone(),
            ..StreamRecord::default()
        }
    }
}

/// Looks up a broadcaster's current stream.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// `None` when the broadcaster is not live.
    async fn current_stream(
        &self,
        broadcaster_id: &str,
    ) -> Result<Option<UpstreamStream>, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct AppToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StreamsPage {
    #[serde(default)]
    data: Vec<UpstreamStream>,
}

/// Helix API client authenticated with an app access token.
#[derive(Debug)]
pub struct HelixClient {
    http: reqwest::Client,
    config: TwitchConfig,
    app_token: Mutex<Option<String>>,
}

impl HelixClient {
    pub fn new(config: TwitchConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            app_token: Mutex::new(None),
        }
    }

    fn streams_url(&self, broadcaster_id: &str) -> Result<reqwest::Url, UpstreamError> {
        let base = format!("{}/helix/streams", self.config.api_base.trim_end_matches('/'));
        reqwest::Url::parse_with_params(&base, &[("user_id", broadcaster_id)])
            .map_err(|e| UpstreamError::Request(e.to_string()))
    }

    async fn app_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.app_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let url = format!("{}/oauth2/token", self.config.auth_base.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form_body(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ]))
            .send()
            .await?;
        let token: AppToken = check(response).await?.json().await?;
        debug!("Obtained app access token");

        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn forget_app_token(&self) {
        *self.app_token.lock().await = None;
    }

    async fn fetch_streams(
        &self,
        url: reqwest::Url,
        token: &str,
    ) -> Result<reqwest::Response, UpstreamError> {
        Ok(self
            .http
            .get(url)
            .header("Client-Id", &self.config.client_id)
            .bearer_auth(token)
            .send()
            .await?)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    warn!(status = status.as_u16(), body = %body, "Helix API returned error");
    Err(UpstreamError::ApiError {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl StreamSource for HelixClient {
    #[instrument(skip(self))]
    async fn current_stream(
        &self,
        broadcaster_id: &str,
    ) -> Result<Option<UpstreamStream>, UpstreamError> {
        let url = self.streams_url(broadcaster_id)?;

        let token = self.app_token().await?;
        let mut response = self.fetch_streams(url.clone(), &token).await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("App access token rejected; requesting a new one");
            self.forget_app_token().await;
            let token = self.app_token().await?;
            response = self.fetch_streams(url, &token).await?;
        }

        let page: StreamsPage = check(response).await?.json().await?;
        Ok(page.data.into_iter().find(|s| s.kind == "live"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> HelixClient {
        let http = crate::http::build_http_client(Duration::from_secs(1)).unwrap();
        HelixClient::new(TwitchConfig::default(), http)
    }

    #[test]
    fn streams_url_encodes_user_id() {
        let url = client().streams_url("12 34").unwrap();
        assert_eq!(url.as_str(), "https://api.twitch.tv/helix/streams?user_id=12+34");
    }

    #[test]
    fn streams_page_decodes_helix_payload() {
        let body = r#"{"data": [{
            "id": "40952121085", "user_id": "101051819", "user_login": "afro",
            "user_name": "Afro", "game_id": "32982", "game_name": "Grand Theft Auto V",
            "type": "live", "title": "Jacob: Digital Den Laptops & Tablets",
            "tags": ["English"], "viewer_count": 1490,
            "started_at": "2021-03-10T03:18:11Z", "language": "en",
            "thumbnail_url": "https://static-cdn.jtvnw.net/previews-ttv/live_user_afro-{width}x{height}.jpg",
            "is_mature": false
        }], "pagination": {}}"#;
        let page: StreamsPage = serde_json::from_str(body).unwrap();
        let record = page.data[0].to_record();
        assert_eq!(record.id, "40952121085");
        assert_eq!(record.broadcaster_login, "afro");
        assert_eq!(record.category_name, "Grand Theft Auto V");
        assert_eq!(record.tags, vec!["English"]);
        assert!(record.is_live());
    }

    #[test]
    fn empty_page_decodes() {
        let page: StreamsPage = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(page.data.is_empty());
    }
}
