use std::sync::{Arc, Mutex};

use emosense_core::{EmotionHistory, PipelineHandle};
use zbus::interface;
use zbus::object_server::SignalEmitter;

/// Shared daemon state updated by the event forwarder.
pub struct DaemonState {
    pub history: EmotionHistory,
}

/// D-Bus interface for the Emosense daemon.
///
/// Bus name: org.emosense.Emosense1
/// Object path: /org/emosense/Emosense1
pub struct EmosenseService {
    state: Arc<Mutex<DaemonState>>,
    pipeline: Arc<PipelineHandle>,
    camera_device: String,
    auto_detect: bool,
}

impl EmosenseService {
    pub fn new(
        state: Arc<Mutex<DaemonState>>,
        pipeline: Arc<PipelineHandle>,
        camera_device: String,
        auto_detect: bool,
    ) -> Self {
        Self {
            state,
            pipeline,
            camera_device,
            auto_detect,
        }
    }

    fn lock_state(&self) -> zbus::fdo::Result<std::sync::MutexGuard<'_, DaemonState>> {
        self.state
            .lock()
            .map_err(|_| zbus::fdo::Error::Failed("daemon state poisoned".into()))
    }
}

#[interface(name = "org.emosense.Emosense1")]
impl EmosenseService {
    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let stats = self.pipeline.scheduler_stats();
        let history_len = self.lock_state()?.history.len();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": self.camera_device,
            "auto_detect": self.auto_detect,
            "running": !self.pipeline.is_finished(),
            "history_len": history_len,
            "scheduler": {
                "total_ticks": stats.total_ticks,
                "invocations": stats.invocations,
                "invocation_rate": stats.invocation_rate,
                "consecutive_slow_frames": stats.consecutive_slow_frames,
                "busy": stats.busy,
            },
        })
        .to_string())
    }

    /// Latest emotion reading as JSON, or JSON null before the first one.
    async fn current(&self) -> zbus::fdo::Result<String> {
        let state = self.lock_state()?;
        match state.history.latest() {
            Some(event) => serde_json::to_string(event)
                .map_err(|e| zbus::fdo::Error::Failed(format!("serialize: {e}"))),
            None => Ok("null".to_string()),
        }
    }

    /// The `count` most recent readings as a JSON array, oldest first.
    async fn recent(&self, count: u32) -> zbus::fdo::Result<String> {
        let state = self.lock_state()?;
        serde_json::to_string(&state.history.recent(count as usize))
            .map_err(|e| zbus::fdo::Error::Failed(format!("serialize: {e}")))
    }

    /// Aggregate per-label statistics over the current history as JSON.
    async fn summary(&self) -> zbus::fdo::Result<String> {
        let state = self.lock_state()?;
        serde_json::to_string(&state.history.summary())
            .map_err(|e| zbus::fdo::Error::Failed(format!("serialize: {e}")))
    }

    /// Trigger one detection outside the automatic cadence. Returns false
    /// when the pipeline is no longer running.
    async fn detect_once(&self) -> zbus::fdo::Result<bool> {
        tracing::debug!("detect_once requested");
        Ok(self.pipeline.request_detection())
    }

    /// Emitted for every processed detection; payload is the emotion
    /// event serialized as JSON.
    #[zbus(signal)]
    pub async fn emotion_detected(
        emitter: &SignalEmitter<'_>,
        payload: String,
    ) -> zbus::Result<()>;
}
