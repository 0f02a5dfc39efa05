//! Collaborator seams: the live frame source and the expression model.
//!
//! The pipeline core never touches a camera or an inference runtime
//! directly; both arrive as trait objects injected at construction. The
//! model additionally runs on its own OS thread so a slow inference call
//! can never stall the tick loop.

use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::types::FaceDetection;

/// A captured grayscale video frame.
///
/// Frames are produced by the source and only read by the pipeline;
/// nothing downstream mutates pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
}

#[derive(Error, Debug)]
pub enum FrameSourceError {
    /// Terminal for the pipeline instance: the feed is gone and retrying
    /// inference without frames is pointless.
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
}

/// Live video feed abstraction.
pub trait FrameSource: Send + 'static {
    /// False until the source can produce frames (camera warm-up, stream
    /// negotiation). Ticks never invoke inference while not ready.
    fn is_ready(&self) -> bool;

    /// Intrinsic frame dimensions, once known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// The most recent frame, if one is available right now. `Ok(None)`
    /// is a normal gap (no frame yet); `Err` is terminal.
    fn latest_frame(&mut self) -> Result<Option<Frame>, FrameSourceError>;
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector worker exited")]
    WorkerExited,
}

/// Black-box single-face expression model.
///
/// `Ok(None)` means "no face found" and must flow through as an unknown
/// reading, never as an error. Implementations run on a dedicated worker
/// thread and may block.
pub trait ExpressionDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceDetection>, DetectError>;
}

pub(crate) type DetectOutcome = Result<Option<FaceDetection>, DetectError>;

struct DetectJob {
    frame: Frame,
    reply: oneshot::Sender<DetectOutcome>,
}

/// Handle to the inference worker thread.
///
/// The channel has capacity 1 and the scheduler's busy flag ensures at
/// most one job is ever outstanding, so completion order trivially equals
/// submission order.
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectJob>,
}

impl DetectorHandle {
    /// Move the detector onto a dedicated OS thread and return a handle.
    /// The thread exits when the handle is dropped.
    pub fn spawn<D: ExpressionDetector>(mut detector: D) -> Self {
        let (tx, mut rx) = mpsc::channel::<DetectJob>(1);

        std::thread::Builder::new()
            .name("emosense-detect".into())
            .spawn(move || {
                tracing::debug!("detector worker started");
                while let Some(job) = rx.blocking_recv() {
                    let result = detector.detect(&job.frame);
                    // The pipeline may have stopped while we were busy; a
                    // dropped receiver just means the result is ignored.
                    let _ = job.reply.send(result);
                }
                tracing::debug!("detector worker exiting");
            })
            .expect("failed to spawn detector thread");

        Self { tx }
    }

    /// Submit a frame for inference. The returned receiver resolves when
    /// the call completes; dropping it discards the result.
    pub(crate) fn submit(
        &self,
        frame: Frame,
    ) -> Result<oneshot::Receiver<DetectOutcome>, DetectError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .try_send(DetectJob {
                frame,
                reply: reply_tx,
            })
            .map_err(|_| DetectError::WorkerExited)?;
        Ok(reply_rx)
    }
}
