//! The detection pipeline: a cooperative, single-task loop that ties the
//! frame source, the adaptive scheduler, the inference worker, and the
//! smoothing stages together.
//!
//! One tokio task owns all pipeline state. The only suspension point is
//! the in-flight inference reply; everything else inside a tick is
//! synchronous and cheap. At most one inference call is outstanding at a
//! time, enforced by the scheduler's busy flag, so completions are
//! processed strictly in invocation order.

use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::detector::{
    DetectOutcome, DetectorHandle, ExpressionDetector, FrameSource, FrameSourceError,
};
use crate::emotion::EmotionSelector;
use crate::scheduler::{AdaptiveScheduler, SchedulerStats};
use crate::smoothing::SmoothingEngine;
use crate::tracking::TrackingHistory;
use crate::types::EmotionEvent;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Terminal: the frame source is gone for this pipeline instance.
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("pipeline task exited unexpectedly")]
    TaskExited,
}

enum Command {
    /// Explicit detection request (manual mode, or on demand in auto mode).
    Detect,
}

/// Running pipeline instance.
///
/// Dropping the handle stops the loop; in-flight inference results that
/// arrive after stop are discarded without touching any buffer.
pub struct PipelineHandle {
    stop_tx: watch::Sender<bool>,
    cmd_tx: mpsc::Sender<Command>,
    stats_rx: watch::Receiver<SchedulerStats>,
    task: tokio::task::JoinHandle<Result<(), PipelineError>>,
}

impl PipelineHandle {
    /// Ask for one detection outside the automatic cadence. Returns false
    /// if the pipeline is no longer running.
    pub fn request_detection(&self) -> bool {
        self.cmd_tx.try_send(Command::Detect).is_ok()
    }

    /// Latest scheduler utilization snapshot.
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.stats_rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop without waiting for it. Useful where the
    /// handle is shared and cannot be consumed.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop the loop and wait for it to wind down.
    pub async fn stop(self) -> Result<(), PipelineError> {
        let _ = self.stop_tx.send(true);
        self.task.await.unwrap_or(Err(PipelineError::TaskExited))
    }

    /// Wait for the pipeline to end on its own (terminal source failure).
    pub async fn join(self) -> Result<(), PipelineError> {
        self.task.await.unwrap_or(Err(PipelineError::TaskExited))
    }
}

/// Owns every piece of per-instance pipeline state. Multiple pipelines
/// (multiple cameras) never share buffers or scheduler flags.
pub struct DetectionPipeline<S: FrameSource> {
    config: PipelineConfig,
    source: S,
    detector: DetectorHandle,
    scheduler: AdaptiveScheduler,
    smoother: SmoothingEngine,
    tracking: TrackingHistory,
    events: mpsc::Sender<EmotionEvent>,
    stats_tx: watch::Sender<SchedulerStats>,
    pending_request: bool,
}

struct Inflight {
    started: Instant,
    reply: oneshot::Receiver<DetectOutcome>,
}

impl<S: FrameSource> DetectionPipeline<S> {
    /// Validate the configuration, spawn the inference worker and the
    /// pipeline task, and hand back the lifecycle handle.
    ///
    /// Emotion events are delivered on `events`; a lagging consumer drops
    /// readings rather than stalling the loop.
    pub fn start<D: ExpressionDetector>(
        source: S,
        detector: D,
        config: PipelineConfig,
        events: mpsc::Sender<EmotionEvent>,
    ) -> Result<PipelineHandle, PipelineError> {
        config.validate()?;

        let scheduler = AdaptiveScheduler::new(
            config.detection_interval,
            config.min_processing_time,
            config.max_consecutive_skips,
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (stats_tx, stats_rx) = watch::channel(scheduler.stats());

        let pipeline = DetectionPipeline {
            smoother: SmoothingEngine::new(config.smoothing_window),
            tracking: TrackingHistory::new(
                config.tracking_history_len,
                config.tracking_decay_window,
                config.position_alpha,
            ),
            scheduler,
            detector: DetectorHandle::spawn(detector),
            source,
            events,
            stats_tx,
            pending_request: false,
            config,
        };

        let task = tokio::spawn(pipeline.run(stop_rx, cmd_rx));

        Ok(PipelineHandle {
            stop_tx,
            cmd_tx,
            stats_rx,
            task,
        })
    }

    async fn run(
        mut self,
        mut stop_rx: watch::Receiver<bool>,
        mut cmd_rx: mpsc::Receiver<Command>,
    ) -> Result<(), PipelineError> {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The in-flight inference call, if any. Held outside of self so
        // the select! arm can poll it while handlers mutate the rest.
        let mut inflight: Option<Inflight> = None;

        info!(
            interval_ms = self.config.detection_interval.as_millis() as u64,
            auto_detect = self.config.auto_detect,
            window = self.config.smoothing_window,
            "detection pipeline started"
        );

        let result = loop {
            tokio::select! {
                // Stop requested, or every handle is gone
                _ = stop_rx.changed() => break Ok(()),

                _ = ticker.tick() => {
                    if inflight.is_none() {
                        match self.on_tick(Instant::now()) {
                            Ok(started) => inflight = started,
                            Err(err) => break Err(err),
                        }
                    } else {
                        // Display-cadence tick while inference is in
                        // flight: invocation-wise a no-op.
                        self.scheduler.tick(Instant::now());
                    }
                }

                Some(Command::Detect) = cmd_rx.recv() => {
                    self.pending_request = true;
                }

                outcome = poll_inflight(&mut inflight), if inflight.is_some() => {
                    if let Some(Inflight { started, .. }) = inflight.take() {
                        self.on_complete(started.elapsed(), outcome);
                    }
                }
            }
        };

        // Dropping `inflight` here makes any late completion unroutable:
        // the worker's send fails and no buffer is touched.
        info!("detection pipeline stopped");
        result
    }

    /// One cooperative tick. Returns the in-flight record when an
    /// inference call was issued.
    fn on_tick(&mut self, now: Instant) -> Result<Option<Inflight>, PipelineError> {
        if !self.source.is_ready() {
            return Ok(None);
        }

        let invoke = if self.pending_request {
            let granted = self.scheduler.request(now);
            if granted {
                self.pending_request = false;
            }
            granted
        } else if self.config.auto_detect {
            self.scheduler.tick(now)
        } else {
            false
        };

        if !invoke {
            return Ok(None);
        }

        match self.source.latest_frame() {
            Ok(Some(frame)) => match self.detector.submit(frame) {
                Ok(reply) => Ok(Some(Inflight {
                    started: now,
                    reply,
                })),
                Err(err) => {
                    warn!(error = %err, "failed to submit frame for inference");
                    self.scheduler.fail();
                    self.publish_stats();
                    Ok(None)
                }
            },
            Ok(None) => {
                // Ready but momentarily frameless; try again next cycle
                self.scheduler.abort();
                Ok(None)
            }
            Err(FrameSourceError::Unavailable(reason)) => {
                self.scheduler.abort();
                warn!(reason = %reason, "frame source unavailable; stopping pipeline");
                Err(PipelineError::SourceUnavailable(reason))
            }
        }
    }

    /// Fold a completed inference call into the pipeline state and emit
    /// the resulting reading.
    fn on_complete(&mut self, duration: std::time::Duration, outcome: Option<DetectOutcome>) {
        match outcome {
            Some(Ok(Some(raw))) => {
                self.scheduler.complete(duration);

                let smoothed = self.smoother.push(raw);
                let (cx, cy) = smoothed.bounding_box.center();
                self.tracking.record(cx, cy, Instant::now());

                let dominant = EmotionSelector::select_or_unknown(&smoothed.expressions);
                debug!(
                    emotion = %dominant.label,
                    confidence = dominant.confidence,
                    duration_ms = duration.as_millis() as u64,
                    "detection processed"
                );

                self.emit(EmotionEvent {
                    emotion: dominant.label,
                    confidence: dominant.confidence,
                    timestamp: Utc::now(),
                    expressions: smoothed.expressions,
                    bounding_box: Some(smoothed.bounding_box),
                    landmarks: smoothed.landmarks,
                });
            }
            Some(Ok(None)) => {
                // No face: a normal outcome, reported as unknown
                self.scheduler.complete(duration);
                debug!("no face detected");
                self.emit(EmotionEvent::unknown(Utc::now()));
            }
            Some(Err(err)) => {
                // One failed detection never halts the loop
                self.scheduler.fail();
                warn!(error = %err, "inference failed; continuing");
            }
            None => {
                self.scheduler.fail();
                warn!("detector worker dropped the reply; continuing");
            }
        }
        self.publish_stats();
    }

    fn emit(&self, event: EmotionEvent) {
        if self.events.try_send(event).is_err() {
            debug!("event channel full or closed; dropping reading");
        }
    }

    fn publish_stats(&self) {
        let _ = self.stats_tx.send(self.scheduler.stats());
    }
}

/// Resolve to the in-flight reply. Only polled when `inflight.is_some()`;
/// a `None` outcome means the worker dropped the reply channel.
async fn poll_inflight(inflight: &mut Option<Inflight>) -> Option<DetectOutcome> {
    match inflight.as_mut() {
        Some(pending) => (&mut pending.reply).await.ok(),
        None => std::future::pending().await,
    }
}
