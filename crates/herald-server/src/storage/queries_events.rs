//! EventSub ledger, stream record, and lookup-table queries.

use herald_core::db::{encode_string_list, unix_timestamp};

use super::db::{DatabaseError, HeraldDatabase};
use super::models::{
    CategoryRow, CategoryRule, EventsubMessage, FilterRule, StreamRecord, StreamRow, TrackedUser,
};

impl HeraldDatabase {
    // =========================================================================
    // EventSub ledger
    // =========================================================================

    /// Record a delivery. Returns `false` when the id was already present.
    pub async fn record_eventsub_message(
        &self,
        message: &EventsubMessage,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO eventsub_messages (id, message_timestamp, message_type, retry_count, recorded_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.message_timestamp)
        .bind(&message.message_type)
        .bind(message.retry_count)
        .bind(message.recorded_at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_eventsub_message(
        &self,
        id: &str,
    ) -> Result<Option<EventsubMessage>, DatabaseError> {
        let message =
            sqlx::query_as::<_, EventsubMessage>("SELECT * FROM eventsub_messages WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;

        Ok(message)
    }

    // =========================================================================
    // Streams
    // =========================================================================

    /// Record a broadcast. Returns `false` if the broadcast id is already stored.
    pub async fn insert_stream(&self, stream: &StreamRecord) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO streams (id, broadcaster_id, broadcaster_login, broadcaster_name, title, category_id, category_name, tags, thumbnail_url, started_at, ended_at, filtered, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stream.id)
        .bind(&stream.broadcaster_id)
        .bind(&stream.broadcaster_login)
        .bind(&stream.broadcaster_name)
        .bind(&stream.title)
        .bind(&stream.category_id)
        .bind(&stream.category_name)
        .bind(encode_string_list(&stream.tags)?)
        .bind(&stream.thumbnail_url)
        .bind(&stream.started_at)
        .bind(stream.ended_at)
        .bind(stream.filtered)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_stream(&self, id: &str) -> Result<Option<StreamRecord>, DatabaseError> {
        sqlx::query_as::<_, StreamRow>("SELECT * FROM streams WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .map(StreamRecord::try_from)
            .transpose()
    }

    /// Most recently started stream for a broadcaster.
    pub async fn latest_stream_for(
        &self,
        broadcaster_id: &str,
    ) -> Result<Option<StreamRecord>, DatabaseError> {
        sqlx::query_as::<_, StreamRow>(
            "SELECT * FROM streams WHERE broadcaster_id = ? ORDER BY started_at DESC, created_at DESC LIMIT 1",
        )
        .bind(broadcaster_id)
        .fetch_optional(self.pool())
        .await?
        .map(StreamRecord::try_from)
        .transpose()
    }

    /// Set the end marker; `0` puts the stream back to live.
    pub async fn set_stream_ended_at(&self, id: &str, ended_at: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE streams SET ended_at = ? WHERE id = ?")
            .bind(ended_at)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_stream_filtered(&self, id: &str, filtered: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE streams SET filtered = ? WHERE id = ?")
            .bind(filtered)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist the per-platform post references of a stream.
    pub async fn save_post_references(&self, stream: &StreamRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE streams SET discord_post_id = ?, discord_post_url = ?, mastodon_post_id = ?, mastodon_post_url = ?, bluesky_post_id = ?, bluesky_post_url = ? WHERE id = ?",
        )
        .bind(&stream.discord_post_id)
        .bind(&stream.discord_post_url)
        .bind(&stream.mastodon_post_id)
        .bind(&stream.mastodon_post_url)
        .bind(&stream.bluesky_post_id)
        .bind(&stream.bluesky_post_url)
        .bind(&stream.id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    // =========================================================================
    // Tracked users, categories, filters
    // =========================================================================

    pub async fn get_tracked_user(
        &self,
        broadcaster_id: &str,
    ) -> Result<Option<TrackedUser>, DatabaseError> {
        let user = sqlx::query_as::<_, TrackedUser>(
            "SELECT broadcaster_id, login, display_name, active, mastodon_handle FROM tracked_users WHERE broadcaster_id = ?",
        )
        .bind(broadcaster_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    pub async fn upsert_tracked_user(&self, user: &TrackedUser) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO tracked_users (broadcaster_id, login, display_name, active, mastodon_handle, created_at) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(broadcaster_id) DO UPDATE SET login = excluded.login, display_name = excluded.display_name, active = excluded.active, mastodon_handle = excluded.mastodon_handle",
        )
        .bind(&user.broadcaster_id)
        .bind(&user.login)
        .bind(&user.display_name)
        .bind(user.active)
        .bind(&user.mastodon_handle)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_category(&self, name: &str) -> Result<Option<CategoryRule>, DatabaseError> {
        sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE name = ?")
            .bind(name)
            .fetch_optional(self.pool())
            .await?
            .map(CategoryRule::try_from)
            .transpose()
    }

    pub async fn upsert_category(&self, category: &CategoryRule) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO categories (name, mastodon_tags, bluesky_tags) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET mastodon_tags = excluded.mastodon_tags, bluesky_tags = excluded.bluesky_tags",
        )
        .bind(&category.name)
        .bind(encode_string_list(&category.mastodon_tags)?)
        .bind(encode_string_list(&category.bluesky_tags)?)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn list_filters(&self) -> Result<Vec<FilterRule>, DatabaseError> {
        let filters = sqlx::query_as::<_, FilterRule>("SELECT * FROM filters ORDER BY id")
            .fetch_all(self.pool())
            .await?;

        Ok(filters)
    }

    pub async fn add_filter(
        &self,
        keyword: &str,
        is_regex: bool,
        case_insensitive: bool,
    ) -> Result<FilterRule, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO filters (keyword, is_regex, case_insensitive) VALUES (?, ?, ?)",
        )
        .bind(keyword)
        .bind(is_regex)
        .bind(case_insensitive)
        .execute(self.pool())
        .await?;

        Ok(FilterRule {
            id: result.last_insert_rowid(),
            keyword: keyword.to_string(),
            is_regex,
            case_insensitive,
        })
    }
}
