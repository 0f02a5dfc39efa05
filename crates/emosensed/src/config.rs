use std::path::PathBuf;
use std::time::Duration;

use emosense_core::PipelineConfig;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum spacing between inference invocations.
    pub detection_interval: Duration,
    /// Tick loop cadence.
    pub tick_interval: Duration,
    /// When false, detection runs only via the DetectOnce D-Bus call.
    pub auto_detect: bool,
    /// Smoothing window size (raw detections averaged together).
    pub smoothing_window: usize,
    /// Completions slower than this count as slow frames.
    pub min_processing_time: Duration,
    /// Slow frames tolerated before cycles are skipped.
    pub max_consecutive_skips: u32,
    /// Tracked centroid trail length.
    pub tracking_history_len: usize,
    /// Trail point fade-out window.
    pub tracking_decay_window: Duration,
    /// Centroid exponential smoothing factor.
    pub position_alpha: f32,
    /// Bounded emotion history size.
    pub history_capacity: usize,
}

impl Config {
    /// Load configuration from `EMOSENSE_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("EMOSENSE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_dir());

        Self {
            camera_device: std::env::var("EMOSENSE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            detection_interval: Duration::from_millis(env_u64(
                "EMOSENSE_DETECTION_INTERVAL_MS",
                100,
            )),
            tick_interval: Duration::from_millis(env_u64("EMOSENSE_TICK_INTERVAL_MS", 16)),
            auto_detect: std::env::var("EMOSENSE_AUTO_DETECT")
                .map(|v| v != "0")
                .unwrap_or(true),
            smoothing_window: env_usize("EMOSENSE_SMOOTHING_WINDOW", 4),
            min_processing_time: Duration::from_millis(env_u64("EMOSENSE_MIN_PROCESSING_MS", 30)),
            max_consecutive_skips: env_u64("EMOSENSE_MAX_CONSECUTIVE_SKIPS", 3) as u32,
            tracking_history_len: env_usize("EMOSENSE_TRACKING_HISTORY_LEN", 30),
            tracking_decay_window: Duration::from_millis(env_u64("EMOSENSE_TRACKING_DECAY_MS", 2000)),
            position_alpha: env_f32("EMOSENSE_POSITION_ALPHA", 0.6),
            history_capacity: env_usize("EMOSENSE_HISTORY_CAPACITY", 300),
        }
    }

    /// The core pipeline configuration (validated by the pipeline itself).
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            detection_interval: self.detection_interval,
            tick_interval: self.tick_interval,
            auto_detect: self.auto_detect,
            smoothing_window: self.smoothing_window,
            min_processing_time: self.min_processing_time,
            max_consecutive_skips: self.max_consecutive_skips,
            tracking_history_len: self.tracking_history_len,
            tracking_decay_window: self.tracking_decay_window,
            position_alpha: self.position_alpha,
            history_capacity: self.history_capacity,
        }
    }
}

fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("emosense/models")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
