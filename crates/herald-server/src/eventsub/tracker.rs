//! Per-broadcaster stream lifecycle: online, offline, and announcement.

use std::sync::Arc;

use tracing::{info, instrument};

use herald_core::db::unix_timestamp;

use super::dedup::{DebounceDecision, Debouncer};
use super::filters::KeywordFilter;
use super::types::{StreamOfflineEvent, StreamOnlineEvent};
use super::upstream::{StreamSource, UpstreamError};
use crate::fanout::{Announcement, FanoutPublisher};
use crate::storage::{DatabaseError, HeraldDatabase};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Where `on_online` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnlineOutcome {
    NotLive,
    UnknownBroadcaster,
    Debounced,
    UpstreamOffline,
    AlreadyRecorded,
    CategoryNotAllowed,
    Filtered,
    Published { posted: usize, failed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineOutcome {
    NoRecord,
    Ended { stream_id: String },
}

#[derive(Clone)]
pub struct StreamLifecycleTracker {
    db: HeraldDatabase,
    debouncer: Debouncer,
    source: Arc<dyn StreamSource>,
    fanout: FanoutPublisher,
}

impl StreamLifecycleTracker {
    pub fn new(
        db: HeraldDatabase,
        debounce_secs: i64,
        source: Arc<dyn StreamSource>,
        fanout: FanoutPublisher,
    ) -> Self {
        Self {
            debouncer: Debouncer::new(db.clone(), debounce_secs),
            db,
            source,
            fanout,
        }
    }

    #[instrument(skip(self, event), fields(broadcaster_id = %event.broadcaster_user_id))]
    pub async fn on_online(&self, event: &StreamOnlineEvent) -> Result<OnlineOutcome, TrackerError> {
        self.on_online_at(event, unix_timestamp()).await
    }

    pub(crate) async fn on_online_at(
        &self,
        event: &StreamOnlineEvent,
        now: i64,
    ) -> Result<OnlineOutcome, TrackerError> {
        if !event.is_live() {
            info!(kind = %event.kind, "Ignoring non-live broadcast");
            return Ok(OnlineOutcome::NotLive);
        }

        let broadcaster_id = event.broadcaster_user_id.as_str();
        let user = match self.db.get_tracked_user(broadcaster_id).await? {
            Some(user) if user.active => user,
            _ => {
                info!("Broadcaster is not tracked");
                return Ok(OnlineOutcome::UnknownBroadcaster);
            }
        };

        if self.debouncer.absorb_restart(broadcaster_id, now).await? == DebounceDecision::Absorbed {
            return Ok(OnlineOutcome::Debounced);
        }

        // The webhook payload is sparse; title, category and tags come from upstream.
        let Some(upstream) = self.source.current_stream(broadcaster_id).await? else {
            info!(login = %user.login, "Upstream reports no live stream");
            return Ok(OnlineOutcome::UpstreamOffline);
        };

        // Persisted before publishing; only the delivery that inserts goes on.
        let mut record = upstream.to_record();
        if !self.db.insert_stream(&record).await? {
            info!(stream_id = %record.id, "Stream already recorded");
            return Ok(OnlineOutcome::AlreadyRecorded);
        }

        let Some(category) = self.db.get_category(&record.category_name).await? else {
            info!(category = %record.category_name, "Category not allow-listed");
            return Ok(OnlineOutcome::CategoryNotAllowed);
        };

        let filter = KeywordFilter::compile(&self.db.list_filters().await?);
        if let Some(hit) = filter.first_match(&record.title, &record.tags) {
            info!(stream_id = %record.id, matched = %hit, "Stream caught by keyword filter");
            self.db.set_stream_filtered(&record.id, true).await?;
            return Ok(OnlineOutcome::Filtered);
        }

        let announcement = Arc::new(Announcement::new(&record, &user, &category));
        let outcome = self.fanout.publish(announcement).await;
        outcome.apply_to(&mut record);
        self.db.save_post_references(&record).await?;

        info!(
            stream_id = %record.id,
            posted = outcome.posted.len(),
            failed = outcome.failed.len(),
            "Stream announced"
        );
        Ok(OnlineOutcome::Published {
            posted: outcome.posted.len(),
            failed: outcome.failed.len(),
        })
    }

    #[instrument(skip(self, event), fields(broadcaster_id = %event.broadcaster_user_id))]
    pub async fn on_offline(
        &self,
        event: &StreamOfflineEvent,
    ) -> Result<OfflineOutcome, TrackerError> {
        self.on_offline_at(event, unix_timestamp()).await
    }

    pub(crate) async fn on_offline_at(
        &self,
        event: &StreamOfflineEvent,
        now: i64,
    ) -> Result<OfflineOutcome, TrackerError> {
        let Some(latest) = self.db.latest_stream_for(&event.broadcaster_user_id).await? else {
            info!(login = %event.broadcaster_user_login, "No recorded stream to end");
            return Ok(OfflineOutcome::NoRecord);
        };

        self.db.set_stream_ended_at(&latest.id, now).await?;
        info!(stream_id = %latest.id, "Stream ended");
        Ok(OfflineOutcome::Ended {
            stream_id: latest.id,
        })
    }
}
