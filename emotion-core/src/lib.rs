pub mod config;
pub mod db;
pub mod emotion;
pub mod error;
pub mod inference;
pub mod models;
pub mod onnx_classifier;

pub use config::EmotionConfig;
pub use emotion::{EmotionReading, EMOTION_LABELS};
pub use error::EmotionError;
pub use inference::{create_strategy, InferenceError, InferenceStrategy, MockStrategy};
pub use onnx_classifier::OnnxEmotionClassifier;
