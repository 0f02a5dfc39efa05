use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use emosense_core::{DetectionPipeline, EmotionHistory};
use emosense_hw::Camera;
use emosense_model::OnnxExpressionDetector;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;

use config::Config;
use dbus_interface::{DaemonState, EmosenseService};

const BUS_NAME: &str = "org.emosense.Emosense1";
const OBJECT_PATH: &str = "/org/emosense/Emosense1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("emosensed starting");

    let config = Config::from_env();

    // Fail fast: camera, models, and pipeline must all come up before the
    // service is offered on the bus.
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("opening camera {}", config.camera_device))?;
    let detector = OnnxExpressionDetector::from_model_dir(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let pipeline = Arc::new(
        DetectionPipeline::start(
            camera.into_source(),
            detector,
            config.pipeline_config(),
            event_tx,
        )
        .context("starting detection pipeline")?,
    );

    let state = Arc::new(Mutex::new(DaemonState {
        history: EmotionHistory::new(config.history_capacity),
    }));

    let service = EmosenseService::new(
        state.clone(),
        pipeline.clone(),
        config.camera_device.clone(),
        config.auto_detect,
    );

    let connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering D-Bus service")?;

    let iface_ref = connection
        .object_server()
        .interface::<_, EmosenseService>(OBJECT_PATH)
        .await?;

    // Forward pipeline events into the history store and out as signals
    let forward_state = state.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize emotion event");
                    continue;
                }
            };
            if let Ok(mut state) = forward_state.lock() {
                state.history.push(event);
            }
            if let Err(e) =
                EmosenseService::emotion_detected(iface_ref.signal_emitter(), payload).await
            {
                tracing::warn!(error = %e, "failed to emit EmotionDetected signal");
            }
        }
        tracing::debug!("event forwarder exiting");
    });

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "emosensed ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("emosensed shutting down");

    // Stop issuing ticks; a late in-flight inference result is discarded
    pipeline.signal_stop();

    Ok(())
}
