use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub session_uuid: String,
    pub device_info: Json<serde_json::Value>,
    pub consent: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
