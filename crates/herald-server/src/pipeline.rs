//! Webhook request handling from signature check to lifecycle dispatch.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

use herald_core::db::unix_timestamp;
use herald_crypto::WebhookVerifier;

use crate::eventsub::types::{STREAM_OFFLINE, STREAM_ONLINE};
use crate::eventsub::{
    DedupLedger, Envelope, MessageType, StreamLifecycleTracker, StreamOfflineEvent,
    StreamOnlineEvent,
};
use crate::storage::EventsubMessage;

pub const TEXT_PLAIN: &str = "text/plain";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid webhook request: {0}")]
    Validation(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl PipelineError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body sent back to the caller; internal failures stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(_) => self.to_string(),
            Self::Upstream(_) | Self::Persistence(_) => "Internal error.".to_string(),
        }
    }
}

impl From<crate::storage::DatabaseError> for PipelineError {
    fn from(e: crate::storage::DatabaseError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<crate::eventsub::TrackerError> for PipelineError {
    fn from(e: crate::eventsub::TrackerError) -> Self {
        match e {
            crate::eventsub::TrackerError::Upstream(e) => Self::Upstream(e.to_string()),
            crate::eventsub::TrackerError::Database(e) => Self::Persistence(e.to_string()),
        }
    }
}

/// The parts of an inbound delivery the pipeline looks at.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub message_id: String,
    pub timestamp: String,
    pub signature: String,
    pub message_type: String,
    pub retry: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: String,
}

impl WebhookResponse {
    fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(TEXT_PLAIN),
            body: body.into(),
        }
    }

    const fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: String::new(),
        }
    }
}

#[derive(Clone)]
pub struct EventPipeline {
    verifier: Arc<WebhookVerifier>,
    ledger: DedupLedger,
    tracker: StreamLifecycleTracker,
}

impl EventPipeline {
    pub const fn new(
        verifier: Arc<WebhookVerifier>,
        ledger: DedupLedger,
        tracker: StreamLifecycleTracker,
    ) -> Self {
        Self {
            verifier,
            ledger,
            tracker,
        }
    }

    #[instrument(skip_all, fields(message_id = %request.message_id, message_type = %request.message_type))]
    pub async fn handle(&self, request: WebhookRequest) -> WebhookResponse {
        if !self.verifier.verify(
            &request.message_id,
            &request.timestamp,
            &request.body,
            &request.signature,
        ) {
            warn!("Webhook signature check failed");
            return WebhookResponse::text(StatusCode::FORBIDDEN, "Authentication failed.");
        }

        match self.process(&request).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    PipelineError::Validation(_) => warn!(error = %e, "Rejected webhook"),
                    _ => error!(error = %e, "Webhook handling failed"),
                }
                WebhookResponse::text(e.status(), e.public_message())
            }
        }
    }

    async fn process(&self, request: &WebhookRequest) -> Result<WebhookResponse, PipelineError> {
        let duplicate = self
            .ledger
            .check_and_record(&EventsubMessage {
                id: request.message_id.clone(),
                message_timestamp: request.timestamp.clone(),
                message_type: request.message_type.clone(),
                retry_count: request.retry.trim().parse().unwrap_or(0),
                recorded_at: unix_timestamp(),
            })
            .await?;

        let message_type = MessageType::parse(&request.message_type).ok_or_else(|| {
            PipelineError::Validation(format!("unknown message type '{}'", request.message_type))
        })?;
        let envelope: Envelope = decode(&request.body)?;

        match message_type {
            MessageType::Verification => {
                let challenge = envelope.challenge.ok_or_else(|| {
                    PipelineError::Validation("verification without challenge".to_string())
                })?;
                info!(subscription = %envelope.subscription.kind, "Webhook subscription verified");
                Ok(WebhookResponse::text(StatusCode::OK, challenge))
            }
            MessageType::Revocation => {
                warn!(
                    subscription_id = %envelope.subscription.id,
                    subscription = %envelope.subscription.kind,
                    status = %envelope.subscription.status,
                    "Webhook subscription revoked"
                );
                Ok(WebhookResponse::empty(StatusCode::NO_CONTENT))
            }
            MessageType::Notification if duplicate => {
                info!("Skipping duplicate notification");
                Ok(WebhookResponse::empty(StatusCode::NO_CONTENT))
            }
            MessageType::Notification => {
                self.notify(&envelope).await?;
                Ok(WebhookResponse::empty(StatusCode::NO_CONTENT))
            }
        }
    }

    /// Only malformed events surface as errors; processing failures are
    /// logged so the source does not redeliver them indefinitely.
    async fn notify(&self, envelope: &Envelope) -> Result<(), PipelineError> {
        let event = envelope
            .event
            .clone()
            .ok_or_else(|| PipelineError::Validation("notification without event".to_string()))?;

        let result = match envelope.subscription.kind.as_str() {
            STREAM_ONLINE => {
                let event: StreamOnlineEvent = decode_value(event)?;
                self.tracker
                    .on_online(&event)
                    .await
                    .map(|outcome| debug!(?outcome, "Online event handled"))
            }
            STREAM_OFFLINE => {
                let event: StreamOfflineEvent = decode_value(event)?;
                self.tracker
                    .on_offline(&event)
                    .await
                    .map(|outcome| debug!(?outcome, "Offline event handled"))
            }
            other => {
                info!(subscription = %other, "Ignoring unhandled subscription type");
                Ok(())
            }
        };

        if let Err(e) = result {
            let e = PipelineError::from(e);
            error!(error = %e, "Notification processing failed");
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, PipelineError> {
    serde_json::from_slice(body).map_err(|e| PipelineError::Validation(e.to_string()))
}

fn decode_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, PipelineError> {
    serde_json::from_value(value).map_err(|e| PipelineError::Validation(e.to_string()))
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
