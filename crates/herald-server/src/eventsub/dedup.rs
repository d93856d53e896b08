//! Replay suppression and online/offline flap absorption.

use tracing::{debug, info, instrument};

use crate::storage::{DatabaseError, EventsubMessage, HeraldDatabase};

/// Persistent record of every delivered message id.
#[derive(Clone)]
pub struct DedupLedger {
    db: HeraldDatabase,
}

impl DedupLedger {
    pub const fn new(db: HeraldDatabase) -> Self {
        Self { db }
    }

    /// Record `message` and report whether its id had been seen before.
    ///
    /// The write happens before the caller interprets the body, so a retry
    /// after a partial failure is still recognized.
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn check_and_record(&self, message: &EventsubMessage) -> Result<bool, DatabaseError> {
        let inserted = self.db.record_eventsub_message(message).await?;
        if !inserted {
            debug!(retry = message.retry_count, "Duplicate EventSub message");
        }
        Ok(!inserted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    /// The previous broadcast was revived; nothing more to do.
    Absorbed,
    Proceed,
}

/// Treats a stream that restarts shortly after ending as a continuation.
#[derive(Clone)]
pub struct Debouncer {
    db: HeraldDatabase,
    interval_secs: i64,
}

impl Debouncer {
    pub const fn new(db: HeraldDatabase, interval_secs: i64) -> Self {
        Self { db, interval_secs }
    }

    #[instrument(skip(self))]
    pub async fn absorb_restart(
        &self,
        broadcaster_id: &str,
        now: i64,
    ) -> Result<DebounceDecision, DatabaseError> {
        let Some(latest) = self.db.latest_stream_for(broadcaster_id).await? else {
            return Ok(DebounceDecision::Proceed);
        };

        if latest.is_live() || now - latest.ended_at >= self.interval_secs {
            return Ok(DebounceDecision::Proceed);
        }

        self.db.set_stream_ended_at(&latest.id, 0).await?;
        info!(
            stream_id = %latest.id,
            ended_secs_ago = now - latest.ended_at,
            "Stream restarted inside debounce window; revived previous record"
        );
        Ok(DebounceDecision::Absorbed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::StreamRecord;

    fn message(id: &str) -> EventsubMessage {
        EventsubMessage {
            id: id.to_string(),
            message_timestamp: "2024-05-01T12:00:00Z".to_string(),
            message_type: "notification".to_string(),
            retry_count: 0,
            recorded_at: 1_714_564_800,
        }
    }

    fn ended_stream(id: &str, ended_at: i64) -> StreamRecord {
        StreamRecord {
            id: id.to_string(),
            broadcaster_id: "42".to_string(),
            broadcaster_login: "streamer".to_string(),
            started_at: "2024-05-01T10:00:00Z".to_string(),
            ended_at,
            ..StreamRecord::default()
        }
    }

    #[tokio::test]
    async fn second_delivery_is_duplicate() {
        let db = HeraldDatabase::open_in_memory().await.unwrap();
        let ledger = DedupLedger::new(db.clone());

        assert!(!ledger.check_and_record(&message("m-1")).await.unwrap());
        assert!(ledger.check_and_record(&message("m-1")).await.unwrap());
        assert!(!ledger.check_and_record(&message("m-2")).await.unwrap());
        assert!(db.get_eventsub_message("m-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn restart_inside_window_revives_previous_stream() {
        let db = HeraldDatabase::open_in_memory().await.unwrap();
        db.insert_stream(&ended_stream("s-1", 1_000)).await.unwrap();
        let debouncer = Debouncer::new(db.clone(), 300);

        let decision = debouncer.absorb_restart("42", 1_005).await.unwrap();
        assert_eq!(decision, DebounceDecision::Absorbed);
        assert!(db.get_stream("s-1").await.unwrap().unwrap().is_live());
    }

    #[tokio::test]
    async fn restart_after_window_proceeds() {
        let db = HeraldDatabase::open_in_memory().await.unwrap();
        db.insert_stream(&ended_stream("s-1", 1_000)).await.unwrap();
        let debouncer = Debouncer::new(db.clone(), 300);

        let decision = debouncer.absorb_restart("42", 1_300).await.unwrap();
        assert_eq!(decision, DebounceDecision::Proceed);
        assert_eq!(db.get_stream("s-1").await.unwrap().unwrap().ended_at, 1_000);
    }

    #[tokio::test]
    async fn live_or_missing_stream_proceeds() {
        let db = HeraldDatabase::open_in_memory().await.unwrap();
        let debouncer = Debouncer::new(db.clone(), 300);
        assert_eq!(
            debouncer.absorb_restart("42", 10).await.unwrap(),
            DebounceDecision::Proceed
        );

        db.insert_stream(&ended_stream("s-1", 0)).await.unwrap();
        assert_eq!(
            debouncer.absorb_restart("42", 10).await.unwrap(),
            DebounceDecision::Proceed
        );
    }
}
