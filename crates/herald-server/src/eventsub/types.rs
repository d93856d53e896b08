//! Wire types for EventSub webhook deliveries.

use serde::Deserialize;

pub const HEADER_MESSAGE_ID: &str = "Twitch-Eventsub-Message-Id";
pub const HEADER_MESSAGE_TIMESTAMP: &str = "Twitch-Eventsub-Message-Timestamp";
pub const HEADER_MESSAGE_SIGNATURE: &str = "Twitch-Eventsub-Message-Signature";
pub const HEADER_MESSAGE_TYPE: &str = "Twitch-Eventsub-Message-Type";
pub const HEADER_MESSAGE_RETRY: &str = "Twitch-Eventsub-Message-Retry";

pub const STREAM_ONLINE: &str = "stream.online";
pub const STREAM_OFFLINE: &str = "stream.offline";

/// Value of the message-type header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Verification,
    Notification,
    Revocation,
}

impl MessageType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "webhook_callback_verification" => Some(Self::Verification),
            "notification" => Some(Self::Notification),
            "revocation" => Some(Self::Revocation),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verification => "webhook_callback_verification",
            Self::Notification => "notification",
            Self::Revocation => "revocation",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub version: String,
}

/// Body shared by all three message types.
///
/// `challenge` is only present on verification, `event` only on
/// notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub subscription: Subscription,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamOnlineEvent {
    #[serde(default)]
    pub id: String,
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub broadcaster_user_login: String,
    #[serde(default)]
    pub broadcaster_user_name: String,
    /// Broadcast kind; only `live` is announced.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub started_at: String,
}

impl StreamOnlineEvent {
    pub fn is_live(&self) -> bool {
        self.kind == "live"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamOfflineEvent {
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub broadcaster_user_login: String,
    #[serde(default)]
    pub broadcaster_user_name: String,
}
