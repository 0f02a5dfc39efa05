//! emosense-model — ONNX-backed face expression detection.
//!
//! Implements the core pipeline's `ExpressionDetector` seam with two
//! ONNX Runtime sessions: UltraFace localizes the face, FER+ classifies
//! the cropped face into expression probabilities.

pub mod expression;
pub mod locator;

use std::path::Path;

use emosense_core::{BoundingBox, DetectError, ExpressionDetector, FaceDetection, Frame};
use thiserror::Error;

pub use expression::{ExpressionError, ExpressionNet, EXPRESSION_LABELS};
pub use locator::{FaceLocator, LocatedFace, LocatorError};

/// Extra margin around the located box before classification; expression
/// models are trained on crops slightly wider than the tight face box.
const CROP_MARGIN: f32 = 0.2;
const CROP_SIZE: u32 = 64;

const ULTRAFACE_MODEL_FILE: &str = "version-RFB-320.onnx";
const FERPLUS_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// ONNX implementation of the pipeline's detector seam.
pub struct OnnxExpressionDetector {
    locator: FaceLocator,
    net: ExpressionNet,
}

impl OnnxExpressionDetector {
    /// Load both models from a directory using their canonical file names.
    /// Fails fast if either file is missing.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self, ModelError> {
        let locator_path = model_dir.join(ULTRAFACE_MODEL_FILE);
        let ferplus_path = model_dir.join(FERPLUS_MODEL_FILE);
        Self::load(
            &locator_path.to_string_lossy(),
            &ferplus_path.to_string_lossy(),
        )
    }

    pub fn load(locator_path: &str, expression_path: &str) -> Result<Self, ModelError> {
        Ok(Self {
            locator: FaceLocator::load(locator_path)?,
            net: ExpressionNet::load(expression_path)?,
        })
    }
}

impl ExpressionDetector for OnnxExpressionDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceDetection>, DetectError> {
        let faces = self
            .locator
            .locate(&frame.data, frame.width, frame.height)
            .map_err(|e| DetectError::InferenceFailed(e.to_string()))?;

        // Single-face pipeline: highest-confidence detection wins
        let Some(face) = faces.first() else {
            return Ok(None);
        };

        let Some(crop) = crop_face(
            &frame.data,
            frame.width,
            frame.height,
            &face.bounding_box,
            CROP_MARGIN,
        ) else {
            // Degenerate box after clamping; treat as no face
            return Ok(None);
        };

        let resized = resize_crop(&crop);
        let expressions = self
            .net
            .classify(&resized)
            .map_err(|e| DetectError::InferenceFailed(e.to_string()))?;

        Ok(Some(FaceDetection {
            bounding_box: face.bounding_box,
            expressions,
            landmarks: None,
            age: None,
            gender: None,
            gender_probability: None,
        }))
    }
}

/// A grayscale sub-image extracted from a frame.
struct Crop {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Extract the face region with margin, clamped to the frame. Returns
/// None when the clamped region has no area.
fn crop_face(
    data: &[u8],
    frame_width: u32,
    frame_height: u32,
    bbox: &BoundingBox,
    margin: f32,
) -> Option<Crop> {
    let dx = bbox.width * margin;
    let dy = bbox.height * margin;

    let x0 = (bbox.x - dx).max(0.0) as u32;
    let y0 = (bbox.y - dy).max(0.0) as u32;
    let x1 = ((bbox.x + bbox.width + dx).min(frame_width as f32)) as u32;
    let y1 = ((bbox.y + bbox.height + dy).min(frame_height as f32)) as u32;

    if x1 <= x0 || y1 <= y0 || data.len() < (frame_width * frame_height) as usize {
        return None;
    }

    let (width, height) = (x1 - x0, y1 - y0);
    let mut out = Vec::with_capacity((width * height) as usize);
    for y in y0..y1 {
        let row = (y * frame_width + x0) as usize;
        out.extend_from_slice(&data[row..row + width as usize]);
    }

    Some(Crop {
        data: out,
        width,
        height,
    })
}

/// Resize a crop to the classifier input size (bilinear).
fn resize_crop(crop: &Crop) -> Vec<u8> {
    let img = image::GrayImage::from_raw(crop.width, crop.height, crop.data.clone())
        .unwrap_or_else(|| image::GrayImage::new(crop.width.max(1), crop.height.max(1)));
    image::imageops::resize(
        &img,
        CROP_SIZE,
        CROP_SIZE,
        image::imageops::FilterType::Triangle,
    )
    .into_raw()
}
