use std::time::Duration;

use thiserror::Error;

use crate::smoothing::DEFAULT_SMOOTHING_WINDOW;
use crate::tracking::{DEFAULT_TRACKING_DECAY_WINDOW, DEFAULT_TRACKING_HISTORY_LEN};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("detection_interval must be positive")]
    NonPositiveDetectionInterval,
    #[error("tick_interval must be positive")]
    NonPositiveTickInterval,
    #[error("smoothing_window must be at least 1")]
    ZeroSmoothingWindow,
    #[error("tracking_history_len must be at least 1")]
    ZeroTrackingHistoryLen,
    #[error("tracking_decay_window must be positive")]
    NonPositiveDecayWindow,
    #[error("position_alpha must be in (0, 1], got {0}")]
    PositionAlphaOutOfRange(f32),
    #[error("history_capacity must be at least 1")]
    ZeroHistoryCapacity,
}

/// Pipeline configuration.
///
/// Validated once at construction; a pipeline never starts with an
/// invalid configuration, so tick-time code can assume these hold.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum spacing between inference invocations.
    pub detection_interval: Duration,
    /// Cadence of the cooperative tick loop (display-refresh analog).
    pub tick_interval: Duration,
    /// When false, inference runs only on an explicit request.
    pub auto_detect: bool,
    /// Number of recent raw detections averaged together.
    pub smoothing_window: usize,
    /// Completions slower than this count as slow frames.
    pub min_processing_time: Duration,
    /// Consecutive slow frames tolerated before cycles are skipped.
    pub max_consecutive_skips: u32,
    /// Maximum number of tracked centroid trail points.
    pub tracking_history_len: usize,
    /// Age at which a trail point becomes fully transparent.
    pub tracking_decay_window: Duration,
    /// Exponential smoothing factor for the tracked centroid, in (0, 1].
    pub position_alpha: f32,
    /// Bounded in-memory emotion history size.
    pub history_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_interval: Duration::from_millis(100),
            tick_interval: Duration::from_millis(16),
            auto_detect: true,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            min_processing_time: Duration::from_millis(30),
            max_consecutive_skips: 3,
            tracking_history_len: DEFAULT_TRACKING_HISTORY_LEN,
            tracking_decay_window: DEFAULT_TRACKING_DECAY_WINDOW,
            position_alpha: 0.6,
            history_capacity: 300,
        }
    }
}

impl PipelineConfig {
    /// Fail fast on nonsensical values, before any tick runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection_interval.is_zero() {
            return Err(ConfigError::NonPositiveDetectionInterval);
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::NonPositiveTickInterval);
        }
        if self.smoothing_window == 0 {
            return Err(ConfigError::ZeroSmoothingWindow);
        }
        if self.tracking_history_len == 0 {
            return Err(ConfigError::ZeroTrackingHistoryLen);
        }
        if self.tracking_decay_window.is_zero() {
            return Err(ConfigError::NonPositiveDecayWindow);
        }
        if !(self.position_alpha > 0.0 && self.position_alpha <= 1.0) {
            return Err(ConfigError::PositionAlphaOutOfRange(self.position_alpha));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        Ok(())
    }
}
