//! Emotion inference strategies
//!
//! Provides an `InferenceStrategy` trait with two implementations:
//! - **Mock** — the fixed neutral reading, used in development and whenever
//!   the model is unavailable
//! - **ONNX** — a local facial-emotion classifier via `ort`
//!   (see `onnx_classifier`)
//!
//! `analyze` never fails. Model-backed strategies degrade to
//! `EmotionReading::fallback()` on any internal error.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::InferenceConfig;
use crate::emotion::EmotionReading;
use crate::onnx_classifier::OnnxEmotionClassifier;

// ============================================================================
// InferenceStrategy trait
// ============================================================================

/// Classifies one frame into an emotion distribution.
#[async_trait]
pub trait InferenceStrategy: Send + Sync {
    /// Analyse a data-URL style base64 frame. Always returns a complete reading.
    async fn analyze(&self, frame_base64: &str) -> EmotionReading;

    /// Strategy name for logging and the health endpoint.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Internal inference failures. Never surfaced past `InferenceStrategy::analyze`.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Invalid base64 frame payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX model not found at {path}")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
}

// ============================================================================
// Payload decoding
// ============================================================================

/// Strip an optional `data:<mime>;base64,` prefix and decode the remainder.
pub fn decode_frame_payload(frame_base64: &str) -> Result<Vec<u8>, InferenceError> {
    let data = match frame_base64.split_once(',') {
        Some((_, rest)) => rest,
        None => frame_base64,
    };
    Ok(BASE64_STANDARD.decode(data.trim())?)
}

// ============================================================================
// MockStrategy
// ============================================================================

/// Deterministic strategy: every frame yields `EmotionReading::fallback()`.
#[derive(Debug, Clone, Default)]
pub struct MockStrategy;

#[async_trait]
impl InferenceStrategy for MockStrategy {
    async fn analyze(&self, _frame_base64: &str) -> EmotionReading {
        EmotionReading::fallback()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Pick the inference strategy for this process.
///
/// `"onnx"` probes the model file; if it is missing or fails to load, a
/// warning is logged and the mock strategy is used instead.
pub fn create_strategy(config: &InferenceConfig) -> Arc<dyn InferenceStrategy> {
    match config.backend.as_str() {
        "onnx" => match OnnxEmotionClassifier::new(PathBuf::from(&config.model_path), config) {
            Ok(classifier) => {
                tracing::info!(model = %config.model_path, "Loaded ONNX emotion classifier");
                Arc::new(classifier)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "ONNX emotion classifier unavailable — serving mock readings"
                );
                Arc::new(MockStrategy)
            }
        },
        "mock" => Arc::new(MockStrategy),
        other => {
            tracing::warn!(backend = other, "Unknown inference backend — serving mock readings");
            Arc::new(MockStrategy)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
