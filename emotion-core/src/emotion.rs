//! Emotion vocabulary and the reading produced by every inference strategy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed label vocabulary. Every reading carries a score for each of these.
pub const EMOTION_LABELS: [&str; 7] = [
    "joy", "sadness", "anger", "fear", "surprise", "disgust", "neutral",
];

pub const FALLBACK_DOMINANT: &str = "neutral";
pub const FALLBACK_INTENSITY: f64 = 0.12;

const FALLBACK_SCORES: [(&str, f64); 7] = [
    ("joy", 0.08),
    ("sadness", 0.05),
    ("anger", 0.03),
    ("fear", 0.04),
    ("surprise", 0.06),
    ("disgust", 0.02),
    ("neutral", 0.72),
];

pub fn is_known_label(label: &str) -> bool {
    EMOTION_LABELS.contains(&label)
}

/// Result of analysing one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub dominant: String,
    pub intensity: f64,
    pub scores: BTreeMap<String, f64>,
}

impl EmotionReading {
    /// The stable neutral-leaning reading returned whenever real inference
    /// is unavailable or fails.
    pub fn fallback() -> Self {
        Self {
            dominant: FALLBACK_DOMINANT.to_string(),
            intensity: FALLBACK_INTENSITY,
            scores: FALLBACK_SCORES
                .iter()
                .map(|(label, score)| (label.to_string(), *score))
                .collect(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}
