//! emosense-core — real-time emotion sensing pipeline.
//!
//! Decides when to run an expensive face-expression model against a live
//! frame source and turns its noisy per-frame output into a stable
//! emotion signal: adaptive invocation scheduling with slow-frame
//! backpressure, windowed and exponential smoothing, a decaying centroid
//! trail, and dominant-emotion selection.
//!
//! The model and the camera are injected behind the [`ExpressionDetector`]
//! and [`FrameSource`] traits; the pipeline itself has no rendering or
//! hardware dependencies and is fully testable with stubs.

pub mod config;
pub mod detector;
pub mod emotion;
pub mod history;
pub mod pipeline;
pub mod scheduler;
pub mod smoothing;
pub mod tracking;
pub mod types;

pub use config::{ConfigError, PipelineConfig};
pub use detector::{
    DetectError, DetectorHandle, ExpressionDetector, Frame, FrameSource, FrameSourceError,
};
pub use emotion::{EmotionError, EmotionSelector};
pub use history::{EmotionHistory, EmotionSummary, LabelStats};
pub use pipeline::{DetectionPipeline, PipelineError, PipelineHandle};
pub use scheduler::{AdaptiveScheduler, SchedulerStats};
pub use smoothing::{DetectionBuffer, EmaFilter, SmoothingEngine};
pub use tracking::{TrackingHistory, TrackingPoint};
pub use types::{
    BoundingBox, DominantEmotion, EmotionEvent, Expressions, FaceDetection, Point, UNKNOWN_EMOTION,
};
