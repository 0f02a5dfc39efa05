//! V4L2 webcam capture via the `v4l` crate.
//!
//! [`Camera`] owns device open and format negotiation; [`CameraSource`]
//! runs a capture thread that keeps a shared latest-frame slot current,
//! which is what the pipeline's "give me the current frame" contract
//! expects from a live preview feed.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use emosense_core::{Frame, FrameSource, FrameSourceError};
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Request YUYV at webcam resolution; accept GREY or Y16 if the
        // driver insists (IR-style sensors).
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = DEFAULT_WIDTH;
        fmt.height = DEFAULT_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Capture a single frame, converting to grayscale. Used by
    /// diagnostics; the pipeline consumes [`CameraSource`] instead.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let gray = buf_to_grayscale(buf, self.width, self.height, self.pixel_format)?;

        Ok(Frame {
            data: gray,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    /// Start continuous capture and return the pipeline-facing source.
    ///
    /// The camera moves onto a dedicated capture thread that overwrites a
    /// shared latest-frame slot; the source reports ready once the first
    /// frame has landed.
    pub fn into_source(self) -> CameraSource {
        let shared = Arc::new(Mutex::new(SharedFrame {
            latest: None,
            failure: None,
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_shared = shared.clone();
        let thread_stop = stop.clone();
        let width = self.width;
        let height = self.height;
        let device_path = self.device_path.clone();

        std::thread::Builder::new()
            .name("emosense-capture".into())
            .spawn(move || capture_loop(self, thread_shared, thread_stop))
            .expect("failed to spawn capture thread");

        tracing::info!(device = %device_path, "camera capture started");

        CameraSource {
            shared,
            stop,
            width,
            height,
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

struct SharedFrame {
    latest: Option<Frame>,
    failure: Option<String>,
}

/// Live frame source backed by the camera capture thread.
///
/// Dropping the source signals the capture thread to stop after its
/// current dequeue.
pub struct CameraSource {
    shared: Arc<Mutex<SharedFrame>>,
    stop: Arc<AtomicBool>,
    width: u32,
    height: u32,
}

impl FrameSource for CameraSource {
    fn is_ready(&self) -> bool {
        match self.shared.lock() {
            Ok(shared) => shared.failure.is_none() && shared.latest.is_some(),
            Err(_) => false,
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn latest_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        let shared = self
            .shared
            .lock()
            .map_err(|_| FrameSourceError::Unavailable("capture thread panicked".into()))?;
        if let Some(reason) = &shared.failure {
            return Err(FrameSourceError::Unavailable(reason.clone()));
        }
        Ok(shared.latest.clone())
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn capture_loop(camera: Camera, shared: Arc<Mutex<SharedFrame>>, stop: Arc<AtomicBool>) {
    let mut stream = match MmapStream::with_buffers(&camera.device, BufType::VideoCapture, STREAM_BUFFERS)
    {
        Ok(stream) => stream,
        Err(e) => {
            fail(&shared, format!("failed to create mmap stream: {e}"));
            return;
        }
    };

    loop {
        if stop.load(Ordering::Relaxed) {
            tracing::debug!("capture thread stopping");
            return;
        }

        let (buf, meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) => {
                fail(&shared, format!("failed to dequeue buffer: {e}"));
                return;
            }
        };

        let gray = match buf_to_grayscale(buf, camera.width, camera.height, camera.pixel_format) {
            Ok(gray) => gray,
            Err(e) => {
                fail(&shared, e.to_string());
                return;
            }
        };

        let frame = Frame {
            data: gray,
            width: camera.width,
            height: camera.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        };

        if let Ok(mut slot) = shared.lock() {
            slot.latest = Some(frame);
        }
    }
}

fn fail(shared: &Arc<Mutex<SharedFrame>>, reason: String) {
    tracing::warn!(reason = %reason, "camera capture failed");
    if let Ok(mut slot) = shared.lock() {
        slot.failure = Some(reason);
    }
}

/// Convert a raw buffer to grayscale based on the negotiated format.
fn buf_to_grayscale(
    buf: &[u8],
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
) -> Result<Vec<u8>, CameraError> {
    let pixels = (width * height) as usize;

    match pixel_format {
        PixelFormat::Grey => {
            if buf.len() < pixels {
                return Err(CameraError::CaptureFailed(format!(
                    "GREY buffer too short: expected {pixels}, got {}",
                    buf.len()
                )));
            }
            Ok(buf[..pixels].to_vec())
        }
        PixelFormat::Y16 => frame::y16_to_grayscale(buf, width, height)
            .map_err(|e| CameraError::CaptureFailed(format!("Y16 conversion failed: {e}"))),
        PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, width, height)
            .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
    }
}
