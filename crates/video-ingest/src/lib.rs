//! Frame sources for the webcam pipeline.
//!
//! Devices are opened through a [`DeviceFactory`] and read synchronously by a
//! single owner. The OpenCV backend is gated behind the `opencv` feature; the
//! synthetic [`PatternFactory`] is always available.

#[cfg(feature = "opencv")]
mod camera;
mod device;
mod pattern;
mod types;

#[cfg(feature = "opencv")]
pub use camera::OpenCvFactory;
pub use device::{CaptureBackend, CaptureDevice, CaptureSettings, DeviceFactory};
pub use pattern::PatternFactory;
pub use types::{CaptureError, Frame, FrameFormat};
