//! Durable history of analyzed frames, with age-based retention.
//!
//! Retention is enforced by `prune_older_than`, which the frame handler
//! calls after every successful insert. With no incoming frames nothing is
//! pruned, so stored events can outlive the window by the idle time since
//! the last request.

use chrono::Utc;
use emotion_core::models::{EmotionEvent, NewEmotionEvent, Session};
use sqlx::types::Json;
use sqlx::SqlitePool;
use thiserror::Error;

pub const MS_PER_DAY: i64 = 86_400_000;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Oldest client timestamp (ms) that survives a prune at `now_ms`.
pub fn retention_cutoff_ms(window_days: u32, now_ms: i64) -> i64 {
    now_ms.saturating_sub(i64::from(window_days).saturating_mul(MS_PER_DAY))
}

#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a session row. Opaque metadata is stored as JSON.
    pub async fn create_session(
        &self,
        session_uuid: &str,
        device_info: &serde_json::Value,
        consent: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO session (session_uuid, device_info, consent) VALUES (?, ?, ?)",
        )
        .bind(session_uuid)
        .bind(Json(device_info))
        .bind(Json(consent))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_session(&self, session_uuid: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, session_uuid, device_info, consent, created_at FROM session WHERE session_uuid = ?",
        )
        .bind(session_uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Append one event row and return its id.
    pub async fn record_event(&self, event: &NewEmotionEvent) -> Result<i64, StoreError> {
        let scores = serde_json::to_string(&event.scores)?;

        let result = sqlx::query(
            r#"
            INSERT INTO emotion_event (session_uuid, ts_ms, dominant, intensity, scores)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.session_uuid)
        .bind(event.ts_ms)
        .bind(&event.dominant)
        .bind(event.intensity)
        .bind(scores)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Delete every event whose client timestamp is strictly older than
    /// `window_days` before now. Returns the number of rows removed.
    pub async fn prune_older_than(&self, window_days: u32) -> Result<u64, StoreError> {
        self.prune_older_than_at(window_days, Utc::now().timestamp_millis())
            .await
    }

    pub async fn prune_older_than_at(
        &self,
        window_days: u32,
        now_ms: i64,
    ) -> Result<u64, StoreError> {
        let cutoff = retention_cutoff_ms(window_days, now_ms);
        let result = sqlx::query("DELETE FROM emotion_event WHERE ts_ms < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            tracing::info!(pruned, cutoff_ms = cutoff, "Pruned expired emotion events");
        }
        Ok(pruned)
    }

    /// All events for one session, oldest client timestamp first.
    pub async fn events_for_session(
        &self,
        session_uuid: &str,
    ) -> Result<Vec<EmotionEvent>, StoreError> {
        let events = sqlx::query_as::<_, EmotionEvent>(
            r#"
            SELECT id, session_uuid, ts_ms, dominant, intensity, scores, created_at
            FROM emotion_event
            WHERE session_uuid = ?
            ORDER BY ts_ms ASC, id ASC
            "#,
        )
        .bind(session_uuid)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    pub async fn count_events(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM emotion_event")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
