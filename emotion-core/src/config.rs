use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::EmotionError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EmotionConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://emotion.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Selects and parameterises the emotion inference strategy.
///
/// `backend = "mock"` always answers with the fixed neutral reading.
/// `backend = "onnx"` loads `model_path` and falls back to the mock when the
/// model cannot be loaded.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceConfig {
    pub backend: String,
    pub model_path: String,
    /// Side length of the square grayscale input the model expects.
    pub input_size: u32,
    /// Vocabulary label for each model output index. Unknown labels are ignored.
    pub labels: Vec<String>,
    pub apply_softmax: bool,
    /// Upper bound of the model's score scale (1.0 or 100.0).
    pub score_scale: f32,
}

/// Output order of the FER+ emotion classifier.
pub const FERPLUS_LABELS: [&str; 8] = [
    "neutral", "joy", "surprise", "sadness", "anger", "disgust", "fear", "contempt",
];

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: "mock".to_string(),
            model_path: String::new(),
            input_size: 64,
            labels: FERPLUS_LABELS.iter().map(|l| l.to_string()).collect(),
            apply_softmax: true,
            score_scale: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub window_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

impl EmotionConfig {
    /// Load config from an optional TOML file, then overlay `EMOTION__*`
    /// environment variables (e.g. `EMOTION__HTTP__PORT=9000`).
    ///
    /// `DATABASE_URL`, when set, wins over both.
    pub fn load(path: &str) -> Result<Self, EmotionError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("EMOTION")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut config: Self = s.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database.url = url;
            }
        }

        Ok(config)
    }
}
