use crate::types::{CaptureError, Frame};

/// Settings applied right after a device opens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureSettings {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    /// Driver-side queue depth. Kept at 1 so reads never return a backlog.
    pub buffer_size: i32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            buffer_size: 1,
        }
    }
}

/// Capture API used to open a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureBackend {
    /// Platform API with the fastest start-up.
    Preferred,
    /// Whatever the capture library picks on its own.
    Default,
}

impl CaptureBackend {
    pub fn label(self) -> &'static str {
        match self {
            CaptureBackend::Preferred => "preferred",
            CaptureBackend::Default => "default",
        }
    }
}

/// An opened camera. Dropping the value releases the device.
pub trait CaptureDevice: Send {
    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError>;

    /// Block until the next frame is available.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Opens capture devices for one configured source.
pub trait DeviceFactory: Send + Sync {
    /// Human readable name of the source, used in logs and errors.
    fn describe(&self) -> String;

    fn open(&self, backend: CaptureBackend) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}
