//! Emotion HTTP REST API
//!
//! Axum-based HTTP server for session start and frame analysis.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum dispatch
//! machinery.
//!
//! Endpoints:
//! - GET  /                      — liveness
//! - GET  /health                — health check with DB status
//! - GET  /version               — server version info
//! - POST /api/v1/session/start  — issue a session id
//! - POST /api/v1/analyze/frame  — analyse one frame for a session

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::handlers::{
    self, AnalyzeError, AnalyzeFrameRequest, AppState, StartSessionRequest,
};

pub const API_PREFIX: &str = "/api/v1";

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/session/start", post(start_session_handler))
        .route("/analyze/frame", post(analyze_frame_handler));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .nest(API_PREFIX, api)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Emotion HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Client-error body: an error description and nothing else.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub fn root_inner() -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "service": "emotion-api",
    })
}

/// Inner health check — queries DB and returns (status_code, json_body).
pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    match emotion_core::db::health_check(state.pool()).await {
        Ok(sqlite_ver) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "sqlite": sqlite_ver,
                "inference": state.strategy.name(),
                "active_sessions": state.registry.len(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "emotion/1",
    })
}

pub async fn start_session_inner(
    state: &AppState,
    req: StartSessionRequest,
) -> (StatusCode, serde_json::Value) {
    let resp = handlers::start_session(state, req).await;
    (StatusCode::OK, to_json(&resp))
}

pub async fn analyze_frame_inner(
    state: &AppState,
    req: AnalyzeFrameRequest,
) -> (StatusCode, serde_json::Value) {
    match handlers::analyze_frame(state, req).await {
        Ok(resp) => (StatusCode::OK, to_json(&resp)),
        Err(e @ AnalyzeError::SessionNotFound) => (
            StatusCode::NOT_FOUND,
            to_json(&ErrorResponse::new(e.to_string())),
        ),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

/// An empty body starts a session with no metadata. Anything else must be
/// a valid request object; axum's rejection is returned as-is otherwise.
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        StartSessionRequest::default()
    } else {
        match Json::<StartSessionRequest>::from_bytes(&body) {
            Ok(Json(req)) => req,
            Err(rejection) => return rejection.into_response(),
        }
    };
    let (status, body) = start_session_inner(&state, req).await;
    (status, Json(body)).into_response()
}

pub async fn analyze_frame_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeFrameRequest>,
) -> impl IntoResponse {
    let (status, body) = analyze_frame_inner(&state, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize response: {}", e);
        serde_json::json!({})
    })
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
