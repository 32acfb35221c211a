//! ONNX inference strategy — local facial-emotion classification
//!
//! Uses the `ort` crate for ONNX Runtime and `image` for frame decoding.
//! Defaults target the FER+ classifier (`emotion-ferplus-8.onnx`): one
//! 64×64 grayscale input of raw 0–255 pixel values, eight output logits.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{ImageReader, Limits};
use ort::session::Session;
use ort::value::Tensor;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::InferenceConfig;
use crate::emotion::{is_known_label, EmotionReading, EMOTION_LABELS};
use crate::inference::{decode_frame_payload, InferenceError, InferenceStrategy};

/// Largest accepted frame width or height, in pixels.
pub const MAX_FRAME_DIMENSION: u32 = 4096;

/// Upper bound on decoder allocations for a single frame.
const MAX_FRAME_ALLOC: u64 = 64 * 1024 * 1024;

/// Local ONNX emotion classifier.
pub struct OnnxEmotionClassifier {
    session: Arc<Mutex<Session>>,
    input_size: u32,
    labels: Arc<Vec<String>>,
    apply_softmax: bool,
    score_scale: f32,
}

impl std::fmt::Debug for OnnxEmotionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmotionClassifier")
            .field("input_size", &self.input_size)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

impl OnnxEmotionClassifier {
    /// Load the ONNX model at `model_path`.
    ///
    /// Returns `InferenceError::ModelNotFound` if the file is missing.
    pub fn new(model_path: PathBuf, config: &InferenceConfig) -> Result<Self, InferenceError> {
        if !model_path.is_file() {
            return Err(InferenceError::ModelNotFound {
                path: model_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_size: config.input_size.max(1),
            labels: Arc::new(config.labels.clone()),
            apply_softmax: config.apply_softmax,
            score_scale: config.score_scale,
        })
    }

    /// Decode and classify one frame, surfacing every failure.
    pub async fn try_analyze(&self, frame_base64: &str) -> Result<EmotionReading, InferenceError> {
        let bytes = decode_frame_payload(frame_base64)?;

        // Decoding and inference are CPU-bound — run on the blocking thread pool.
        let session = Arc::clone(&self.session);
        let labels = Arc::clone(&self.labels);
        let size = self.input_size;
        let apply_softmax = self.apply_softmax;
        let score_scale = self.score_scale;

        tokio::task::spawn_blocking(move || {
            let pixels = preprocess(&bytes, size)?;
            let mut session_guard = session
                .lock()
                .map_err(|e| InferenceError::OnnxInference(format!("session lock poisoned: {e}")))?;
            let raw = classify_sync(&mut session_guard, pixels, size)?;
            reading_from_output(&raw, &labels, apply_softmax, score_scale)
        })
        .await
        .map_err(|e| InferenceError::OnnxInference(format!("spawn_blocking join error: {e}")))?
    }
}

#[async_trait]
impl InferenceStrategy for OnnxEmotionClassifier {
    async fn analyze(&self, frame_base64: &str) -> EmotionReading {
        match self.try_analyze(frame_base64).await {
            Ok(reading) => reading,
            Err(e) => {
                tracing::debug!(error = %e, "Emotion inference failed — returning fallback reading");
                EmotionReading::fallback()
            }
        }
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Decode an encoded image into a `size`×`size` grayscale buffer of 0–255 floats.
pub fn preprocess(bytes: &[u8], size: u32) -> Result<Vec<f32>, InferenceError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_FRAME_DIMENSION);
    limits.max_image_height = Some(MAX_FRAME_DIMENSION);
    limits.max_alloc = Some(MAX_FRAME_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    reader.limits(limits);

    let gray = reader.decode()?.to_luma8();
    let resized = image::imageops::resize(&gray, size, size, FilterType::Triangle);
    Ok(resized.pixels().map(|p| p.0[0] as f32).collect())
}

/// Run the classifier synchronously on a preprocessed frame.
fn classify_sync(
    session: &mut Session,
    pixels: Vec<f32>,
    size: u32,
) -> Result<Vec<f32>, InferenceError> {
    let shape = vec![1i64, 1, size as i64, size as i64];
    let input = Tensor::from_array((shape, pixels))
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

    // Expected shape: [1, num_classes]
    let (_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::OnnxInference(e.to_string()))?;

    Ok(data.to_vec())
}

/// Map raw model output onto the emotion vocabulary.
///
/// `labels[i]` names output `i`; outputs whose label is outside the
/// vocabulary are dropped. Scores and intensity are divided by `score_scale`
/// and clamped to [0, 1]. Vocabulary labels without an output score 0.
/// Any NaN or infinite score rejects the whole output.
pub fn reading_from_output(
    raw: &[f32],
    labels: &[String],
    apply_softmax: bool,
    score_scale: f32,
) -> Result<EmotionReading, InferenceError> {
    if raw.len() != labels.len() {
        return Err(InferenceError::InvalidOutput(format!(
            "expected {} scores, got {}",
            labels.len(),
            raw.len()
        )));
    }

    let values = if apply_softmax { softmax(raw) } else { raw.to_vec() };
    let scale = if score_scale > 0.0 { score_scale } else { 1.0 };
    if let Some(bad) = values.iter().map(|v| v / scale).find(|v| !v.is_finite()) {
        return Err(InferenceError::InvalidOutput(format!("non-finite score {bad}")));
    }

    let mut scores: BTreeMap<String, f64> =
        EMOTION_LABELS.iter().map(|l| (l.to_string(), 0.0)).collect();
    for (label, value) in labels.iter().zip(values) {
        if !is_known_label(label) {
            continue;
        }
        if let Some(score) = scores.get_mut(label.as_str()) {
            *score += (value / scale).clamp(0.0, 1.0) as f64;
        }
    }

    let (dominant, intensity) = labels
        .iter()
        .filter(|l| is_known_label(l))
        .filter_map(|l| scores.get(l.as_str()).map(|s| (l.clone(), *s)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| InferenceError::InvalidOutput("no vocabulary labels configured".into()))?;

    Ok(EmotionReading {
        dominant,
        intensity: intensity.clamp(0.0, 1.0),
        scores,
    })
}

fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|e| e / sum).collect()
    } else {
        exps
    }
}

// ============================================================================
// TESTS
// ============================================================================
