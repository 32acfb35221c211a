//! Session start and frame analysis.
//!
//! The only error surfaced to callers is an unknown session. Persistence
//! failures are logged and dropped; inference failures never reach here.

use std::sync::Arc;

use chrono::Utc;
use emotion_core::models::NewEmotionEvent;
use emotion_core::{EmotionConfig, EmotionReading, InferenceStrategy};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::registry::SessionRegistry;
use crate::store::EventStore;

/// Everything a request needs, owned by the running process.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub store: EventStore,
    pub strategy: Arc<dyn InferenceStrategy>,
    pub config: EmotionConfig,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        strategy: Arc<dyn InferenceStrategy>,
        config: EmotionConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            store: EventStore::new(pool),
            strategy,
            config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AnalyzeError {
    #[error("session not found")]
    SessionNotFound,
}

/// Opaque client metadata. Both maps must be JSON objects when present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    #[serde(default, alias = "device_info")]
    pub device_info: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub consent: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFrameRequest {
    #[serde(alias = "session_uuid")]
    pub session_id: String,
    #[serde(alias = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(alias = "frame_base64")]
    pub frame_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFrameResponse {
    pub status: String,
    pub received_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<std::collections::BTreeMap<String, f64>>,
}

impl AnalyzeFrameResponse {
    pub fn ok(received_at: i64, reading: EmotionReading) -> Self {
        Self {
            status: "ok".to_string(),
            received_at,
            dominant: Some(reading.dominant),
            intensity: Some(reading.intensity),
            scores: Some(reading.scores),
        }
    }
}

/// Issue a session id and try to persist it. Never fails.
pub async fn start_session(state: &AppState, req: StartSessionRequest) -> StartSessionResponse {
    let session_id = state.registry.issue();

    let device_info = serde_json::Value::Object(req.device_info);
    let consent = serde_json::Value::Object(req.consent);

    if let Err(e) = state
        .store
        .create_session(&session_id, &device_info, &consent)
        .await
    {
        tracing::warn!(
            session_id = %session_id,
            error = %e,
            "Failed to persist session; continuing in memory"
        );
    }

    tracing::info!(session_id = %session_id, "Session started");
    StartSessionResponse { session_id }
}

/// Analyse one frame for a known session, then record it and prune expired events.
pub async fn analyze_frame(
    state: &AppState,
    req: AnalyzeFrameRequest,
) -> Result<AnalyzeFrameResponse, AnalyzeError> {
    if !state.registry.is_valid(&req.session_id) {
        tracing::debug!(session_id = %req.session_id, "Rejected frame for unknown session");
        return Err(AnalyzeError::SessionNotFound);
    }

    let reading = state.strategy.analyze(&req.frame_base64).await;

    let event = NewEmotionEvent::from_reading(&req.session_id, req.timestamp_ms, &reading);
    record_and_prune(state, &event).await;

    Ok(AnalyzeFrameResponse::ok(Utc::now().timestamp_millis(), reading))
}

async fn record_and_prune(state: &AppState, event: &NewEmotionEvent) {
    if let Err(e) = state.store.record_event(event).await {
        tracing::warn!(session_id = %event.session_uuid, error = %e, "Failed to record emotion event");
        return;
    }

    if let Err(e) = state
        .store
        .prune_older_than(state.config.retention.window_days)
        .await
    {
        tracing::warn!(error = %e, "Failed to prune expired emotion events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emotion_core::config::DatabaseConfig;
    use emotion_core::MockStrategy;

    use crate::store::MS_PER_DAY;

    async fn make_state() -> AppState {
        let pool = emotion_core::db::create_pool(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .unwrap();
        emotion_core::db::ensure_schema(&pool).await.unwrap();
        AppState::new(pool, Arc::new(MockStrategy), EmotionConfig::default())
    }

    fn frame(session_id: &str, timestamp_ms: i64, payload: &str) -> AnalyzeFrameRequest {
        AnalyzeFrameRequest {
            session_id: session_id.to_string(),
            timestamp_ms,
            frame_base64: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_session_registers_and_persists() {
        let state = make_state().await;
        let resp = start_session(&state, StartSessionRequest::default()).await;

        assert!(state.registry.is_valid(&resp.session_id));
        let row = state.store.get_session(&resp.session_id).await.unwrap().unwrap();
        assert_eq!(row.device_info.0, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_start_session_survives_persistence_failure() {
        let state = make_state().await;
        state.pool().close().await;

        let resp = start_session(&state, StartSessionRequest::default()).await;
        assert!(state.registry.is_valid(&resp.session_id));
    }

    #[tokio::test]
    async fn test_analyze_unknown_session_has_no_side_effects() {
        let state = make_state().await;
        let now = Utc::now().timestamp_millis();

        let result = analyze_frame(&state, frame("wrong", now, "AAAA")).await;
        assert_eq!(result.unwrap_err(), AnalyzeError::SessionNotFound);

        let result = analyze_frame(&state, frame("", now, "AAAA")).await;
        assert_eq!(result.unwrap_err(), AnalyzeError::SessionNotFound);

        assert_eq!(state.store.count_events().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_analyze_garbage_payload_returns_fallback() {
        let state = make_state().await;
        let session = start_session(&state, StartSessionRequest::default()).await;
        let now = Utc::now().timestamp_millis();

        let resp = analyze_frame(&state, frame(&session.session_id, now, "not-base64-image"))
            .await
            .unwrap();

        assert_eq!(resp.status, "ok");
        assert_eq!(resp.dominant.as_deref(), Some("neutral"));
        assert_eq!(resp.intensity, Some(0.12));
        assert_eq!(resp.scores.as_ref().map(|s| s.len()), Some(7));
        assert!(resp.received_at >= now);

        let events = state.store.events_for_session(&session.session_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ts_ms, now);
    }

    #[tokio::test]
    async fn test_analyze_prunes_expired_events_on_insert() {
        let state = make_state().await;
        let session = start_session(&state, StartSessionRequest::default()).await;
        let now = Utc::now().timestamp_millis();

        let stale = EmotionReading::fallback();
        state
            .store
            .record_event(&NewEmotionEvent::from_reading(
                &session.session_id,
                now - 40 * MS_PER_DAY,
                &stale,
            ))
            .await
            .unwrap();

        analyze_frame(&state, frame(&session.session_id, now, ""))
            .await
            .unwrap();

        let events = state.store.events_for_session(&session.session_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ts_ms, now);
    }

    #[tokio::test]
    async fn test_analyze_survives_persistence_failure() {
        let state = make_state().await;
        let session = start_session(&state, StartSessionRequest::default()).await;
        state.pool().close().await;

        let resp = analyze_frame(&state, frame(&session.session_id, 1, "garbage"))
            .await
            .unwrap();
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.dominant.as_deref(), Some("neutral"));
        assert_eq!(resp.intensity, Some(0.12));
        assert_eq!(resp.scores, Some(EmotionReading::fallback().scores));
    }

    #[test]
    fn test_request_accepts_snake_case_aliases() {
        let req: AnalyzeFrameRequest = serde_json::from_value(serde_json::json!({
            "session_uuid": "abc",
            "timestamp": 42,
            "frame_base64": "data:image/png;base64,AAAA"
        }))
        .unwrap();
        assert_eq!(req.session_id, "abc");
        assert_eq!(req.timestamp_ms, 42);

        let req: AnalyzeFrameRequest = serde_json::from_value(serde_json::json!({
            "sessionId": "def",
            "timestampMs": 7,
            "frameBase64": ""
        }))
        .unwrap();
        assert_eq!(req.session_id, "def");
        assert_eq!(req.timestamp_ms, 7);
    }

    #[test]
    fn test_start_request_defaults_to_empty_metadata() {
        let req: StartSessionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.device_info.is_empty());
        assert!(req.consent.is_empty());

        let req: StartSessionRequest =
            serde_json::from_str(r#"{"device_info": {"ua": "x"}}"#).unwrap();
        assert_eq!(req.device_info["ua"], "x");
    }

    #[test]
    fn test_start_request_rejects_non_object_metadata() {
        for body in [
            r#"{"deviceInfo": 5}"#,
            r#"{"consent": "yes"}"#,
            r#"{"deviceInfo": [1, 2]}"#,
            r#"{"consent": null}"#,
        ] {
            assert!(
                serde_json::from_str::<StartSessionRequest>(body).is_err(),
                "accepted {body}"
            );
        }
    }

    #[tokio::test]
    async fn test_start_session_persists_metadata_objects() {
        let state = make_state().await;
        let req: StartSessionRequest = serde_json::from_value(serde_json::json!({
            "deviceInfo": {"ua": "unit"},
            "consent": {"camera": true}
        }))
        .unwrap();
        let resp = start_session(&state, req).await;

        let row = state.store.get_session(&resp.session_id).await.unwrap().unwrap();
        assert_eq!(row.device_info.0, serde_json::json!({"ua": "unit"}));
        assert_eq!(row.consent.0, serde_json::json!({"camera": true}));
    }
}
