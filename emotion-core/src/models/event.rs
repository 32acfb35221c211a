use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::BTreeMap;

use crate::emotion::EmotionReading;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmotionEvent {
    pub id: i64,
    pub session_uuid: String,
    /// Client clock, milliseconds since the Unix epoch.
    pub ts_ms: i64,
    pub dominant: String,
    pub intensity: f64,
    pub scores: Json<BTreeMap<String, f64>>,
    pub created_at: DateTime<Utc>,
}

/// An event ready to be written; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmotionEvent {
    pub session_uuid: String,
    pub ts_ms: i64,
    pub dominant: String,
    pub intensity: f64,
    pub scores: BTreeMap<String, f64>,
}

impl NewEmotionEvent {
    pub fn from_reading(session_uuid: &str, ts_ms: i64, reading: &EmotionReading) -> Self {
        Self {
            session_uuid: session_uuid.to_string(),
            ts_ms,
            dominant: reading.dominant.clone(),
            intensity: reading.intensity,
            scores: reading.scores.clone(),
        }
    }
}
