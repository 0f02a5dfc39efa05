//! emosense-hw — Hardware abstraction for webcam capture.
//!
//! Provides a V4L2-backed implementation of the core pipeline's
//! `FrameSource` trait plus format conversion helpers.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraSource, DeviceInfo, PixelFormat};
