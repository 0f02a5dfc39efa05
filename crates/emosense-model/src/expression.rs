//! FER+ expression classification via ONNX Runtime.
//!
//! Classifies a 64x64 grayscale face crop into eight expression
//! categories. The model emits logits; softmax turns them into the
//! probability map the pipeline consumes.

use emosense_core::Expressions;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const FERPLUS_INPUT_SIZE: usize = 64;
const FERPLUS_NUM_CATEGORIES: usize = 8;

/// Output order of the FER+ model, mapped to the labels this crate
/// reports. The order is fixed by the model and also fixes the
/// first-seen tie-break order downstream.
pub const EXPRESSION_LABELS: [&str; FERPLUS_NUM_CATEGORIES] = [
    "neutral",
    "happy",
    "surprised",
    "sad",
    "angry",
    "disgusted",
    "fearful",
    "contempt",
];

#[derive(Error, Debug)]
pub enum ExpressionError {
    #[error("model file not found: {0} — download emotion-ferplus-8.onnx and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop must be {expected} bytes, got {actual}")]
    BadCropSize { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FER+-based expression classifier.
pub struct ExpressionNet {
    session: Session,
}

impl ExpressionNet {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ExpressionError> {
        if !Path::new(model_path).exists() {
            return Err(ExpressionError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded FER+ model");

        Ok(Self { session })
    }

    /// Classify a 64x64 grayscale face crop into expression probabilities.
    pub fn classify(&mut self, crop: &[u8]) -> Result<Expressions, ExpressionError> {
        let expected = FERPLUS_INPUT_SIZE * FERPLUS_INPUT_SIZE;
        if crop.len() != expected {
            return Err(ExpressionError::BadCropSize {
                expected,
                actual: crop.len(),
            });
        }

        let input = preprocess(crop);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExpressionError::InferenceFailed(format!("logits: {e}")))?;

        if logits.len() < FERPLUS_NUM_CATEGORIES {
            return Err(ExpressionError::InferenceFailed(format!(
                "expected {FERPLUS_NUM_CATEGORIES} logits, got {}",
                logits.len()
            )));
        }

        let probabilities = softmax(&logits[..FERPLUS_NUM_CATEGORIES]);
        let mut expressions = Expressions::new();
        for (label, probability) in EXPRESSION_LABELS.iter().zip(probabilities) {
            expressions.insert(*label, probability);
        }

        Ok(expressions)
    }
}

/// FER+ expects raw 0–255 grayscale values in a [1, 1, 64, 64] tensor.
fn preprocess(crop: &[u8]) -> Array4<f32> {
    let size = FERPLUS_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
    for y in 0..size {
        for x in 0..size {
            tensor[[0, 0, y, x]] = crop[y * size + x] as f32;
        }
    }
    tensor
}

/// Numerically-stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![1.0 / logits.len() as f32; logits.len()]
    }
}
