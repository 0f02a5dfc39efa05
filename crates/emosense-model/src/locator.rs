//! UltraFace face localization via ONNX Runtime.
//!
//! Runs the version-RFB-320 model: a lightweight single-stage face
//! detector producing per-anchor scores and relative corner boxes,
//! filtered by confidence and IoU NMS.

use emosense_core::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const ULTRAFACE_INPUT_WIDTH: usize = 320;
const ULTRAFACE_INPUT_HEIGHT: usize = 240;
const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;
const ULTRAFACE_CONFIDENCE_THRESHOLD: f32 = 0.7;
const ULTRAFACE_NMS_THRESHOLD: f32 = 0.5;
/// Values per anchor in the score tensor: [background, face].
const ULTRAFACE_SCORE_STRIDE: usize = 2;
/// Values per anchor in the box tensor: [x1, y1, x2, y2], relative.
const ULTRAFACE_BOX_STRIDE: usize = 4;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("model file not found: {0} — download version-RFB-320.onnx and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A localized face: box in source-frame pixel space plus model score.
#[derive(Debug, Clone)]
pub struct LocatedFace {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

/// UltraFace-based single-face locator.
pub struct FaceLocator {
    session: Session,
    /// Output tensor indices (scores, boxes), discovered by name at load
    /// time with a positional fallback.
    output_indices: (usize, usize),
}

impl FaceLocator {
    /// Load the UltraFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LocatorError> {
        if !Path::new(model_path).exists() {
            return Err(LocatorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded UltraFace model"
        );

        if output_names.len() < 2 {
            return Err(LocatorError::InferenceFailed(format!(
                "UltraFace model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let scores_idx = output_names.iter().position(|n| n == "scores").unwrap_or(0);
        let boxes_idx = output_names.iter().position(|n| n == "boxes").unwrap_or(1);

        Ok(Self {
            session,
            output_indices: (scores_idx, boxes_idx),
        })
    }

    /// Locate faces in a grayscale frame, best first.
    pub fn locate(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<LocatedFace>, LocatorError> {
        let input = preprocess(frame, width, height)
            .ok_or_else(|| LocatorError::InferenceFailed("frame buffer too short".into()))?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (scores_idx, boxes_idx) = self.output_indices;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| LocatorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| LocatorError::InferenceFailed(format!("boxes: {e}")))?;

        let candidates = decode(
            scores,
            boxes,
            width as f32,
            height as f32,
            ULTRAFACE_CONFIDENCE_THRESHOLD,
        );
        let mut faces = nms(candidates, ULTRAFACE_NMS_THRESHOLD);
        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(faces)
    }
}

/// Resize a grayscale frame to the model's input and normalize into a
/// 3-channel NCHW tensor (grayscale replicated to RGB).
fn preprocess(frame: &[u8], width: u32, height: u32) -> Option<Array4<f32>> {
    if frame.len() < (width * height) as usize {
        return None;
    }

    let img = image::GrayImage::from_raw(width, height, frame[..(width * height) as usize].to_vec())?;
    let resized = image::imageops::resize(
        &img,
        ULTRAFACE_INPUT_WIDTH as u32,
        ULTRAFACE_INPUT_HEIGHT as u32,
        image::imageops::FilterType::Triangle,
    );

    let mut tensor =
        Array4::<f32>::zeros((1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let normalized = (pixel.0[0] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = normalized;
        tensor[[0, 1, y, x]] = normalized;
        tensor[[0, 2, y, x]] = normalized;
    }

    Some(tensor)
}

/// Decode per-anchor scores and relative corner boxes into pixel-space
/// candidates above the confidence threshold.
fn decode(
    scores: &[f32],
    boxes: &[f32],
    frame_width: f32,
    frame_height: f32,
    threshold: f32,
) -> Vec<LocatedFace> {
    let num_anchors = (scores.len() / ULTRAFACE_SCORE_STRIDE).min(boxes.len() / ULTRAFACE_BOX_STRIDE);
    let mut candidates = Vec::new();

    for idx in 0..num_anchors {
        let confidence = scores[idx * ULTRAFACE_SCORE_STRIDE + 1];
        if confidence <= threshold {
            continue;
        }

        let off = idx * ULTRAFACE_BOX_STRIDE;
        let x1 = (boxes[off] * frame_width).clamp(0.0, frame_width);
        let y1 = (boxes[off + 1] * frame_height).clamp(0.0, frame_height);
        let x2 = (boxes[off + 2] * frame_width).clamp(0.0, frame_width);
        let y2 = (boxes[off + 3] * frame_height).clamp(0.0, frame_height);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(LocatedFace {
            bounding_box: BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
            },
            confidence,
        });
    }

    candidates
}

/// Non-Maximum Suppression: remove overlapping candidates.
fn nms(mut candidates: Vec<LocatedFace>, iou_threshold: f32) -> Vec<LocatedFace> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<LocatedFace> = Vec::new();
    for candidate in candidates {
        let overlaps = keep
            .iter()
            .any(|kept| iou(&kept.bounding_box, &candidate.bounding_box) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> LocatedFace {
        LocatedFace {
            bounding_box: BoundingBox {
                x,
                y,
                width: w,
                height: h,
            },
            confidence,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        let b = BoundingBox {
            x: 20.0,
            y: 20.0,
            width: 10.0,
            height: 10.0,
        };
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let candidates = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.9),
            face(5.0, 5.0, 100.0, 100.0, 0.8),
            face(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(candidates, 0.5);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_by_threshold_and_scales() {
        // Two anchors; only the second clears the threshold
        let scores = vec![0.9, 0.1, 0.1, 0.9];
        let boxes = vec![
            0.0, 0.0, 0.5, 0.5, // anchor 0 (rejected)
            0.25, 0.25, 0.75, 0.75, // anchor 1
        ];
        let result = decode(&scores, &boxes, 320.0, 240.0, 0.7);
        assert_eq!(result.len(), 1);
        let bbox = result[0].bounding_box;
        assert!((bbox.x - 80.0).abs() < 1e-3);
        assert!((bbox.y - 60.0).abs() < 1e-3);
        assert!((bbox.width - 160.0).abs() < 1e-3);
        assert!((bbox.height - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_degenerate_boxes() {
        let scores = vec![0.1, 0.95];
        let boxes = vec![0.5, 0.5, 0.5, 0.5]; // zero area
        assert!(decode(&scores, &boxes, 320.0, 240.0, 0.7).is_empty());
    }

    #[test]
    fn test_decode_clamps_to_frame() {
        let scores = vec![0.1, 0.95];
        let boxes = vec![-0.2, -0.2, 1.3, 1.3];
        let result = decode(&scores, &boxes, 320.0, 240.0, 0.7);
        assert_eq!(result.len(), 1);
        let bbox = result[0].bounding_box;
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 0.0);
        assert!((bbox.width - 320.0).abs() < 1e-3);
        assert!((bbox.height - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let frame = vec![127u8; 64 * 48];
        let tensor = preprocess(&frame, 64, 48).unwrap();
        assert_eq!(
            tensor.shape(),
            &[1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH]
        );
        // Pixel 127 normalizes to 0.0, replicated across channels
        assert!(tensor[[0, 0, 0, 0]].abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 10, 10]], tensor[[0, 2, 10, 10]]);
    }

    #[test]
    fn test_preprocess_short_buffer() {
        assert!(preprocess(&[0u8; 10], 64, 48).is_none());
    }
}
