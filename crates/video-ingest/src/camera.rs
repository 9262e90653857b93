//! OpenCV-backed camera capture.

use chrono::Utc;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, warn};

use crate::{
    device::{CaptureBackend, CaptureDevice, CaptureSettings, DeviceFactory},
    types::{CaptureError, Frame},
};

/// Opens a camera by index (`0`, `/dev/video0`) or by file/stream URI.
#[derive(Clone, Debug)]
pub struct OpenCvFactory {
    uri: String,
}

impl OpenCvFactory {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl DeviceFactory for OpenCvFactory {
    fn describe(&self) -> String {
        self.uri.clone()
    }

    fn open(&self, backend: CaptureBackend) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let api = backend_api(backend);
        let opened = match parse_device_index(&self.uri) {
            Some(index) => VideoCapture::new(index, api),
            None => VideoCapture::from_file(&self.uri, api),
        };
        let cap = match opened {
            Ok(cap) => cap,
            Err(err) => {
                warn!(
                    "failed to open {} with {} backend: {err}",
                    self.uri,
                    backend.label()
                );
                return Err(self.open_error(backend));
            }
        };
        if !cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
            return Err(self.open_error(backend));
        }
        debug!("opened {} with {} backend", self.uri, backend.label());
        Ok(Box::new(OpenCvCamera {
            cap,
            frame: Mat::default(),
            scratch: Mat::default(),
            target: (0, 0),
        }))
    }
}

impl OpenCvFactory {
    fn open_error(&self, backend: CaptureBackend) -> CaptureError {
        CaptureError::Open {
            uri: self.uri.clone(),
            backend: backend.label(),
        }
    }
}

struct OpenCvCamera {
    cap: VideoCapture,
    frame: Mat,
    scratch: Mat,
    target: (i32, i32),
}

impl CaptureDevice for OpenCvCamera {
    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        let cap = &mut self.cap;
        let _ = cap.set(videoio::CAP_PROP_BUFFERSIZE, settings.buffer_size as f64);
        let mut fourcc_set = false;
        if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
            if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
                fourcc_set = true;
            }
        }
        if !fourcc_set {
            debug!("camera rejected MJPG fourcc; keeping driver default");
        }
        let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, settings.width as f64);
        let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, settings.height as f64);
        let _ = cap.set(videoio::CAP_PROP_FPS, settings.fps);
        self.target = (settings.width, settings.height);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || size.width <= 0 {
            return Err(CaptureError::EmptyRead);
        }

        let (target_w, target_h) = if self.target.0 > 0 && self.target.1 > 0 {
            self.target
        } else {
            (size.width, size.height)
        };

        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &self.frame,
                &mut self.scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &self.scratch
        } else {
            &self.frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Frame::bgr8(data, target_w, target_h, Utc::now().timestamp_millis())
    }
}

fn backend_api(backend: CaptureBackend) -> i32 {
    match backend {
        CaptureBackend::Preferred => preferred_api(),
        CaptureBackend::Default => videoio::CAP_ANY,
    }
}

#[cfg(target_os = "windows")]
fn preferred_api() -> i32 {
    videoio::CAP_DSHOW
}

#[cfg(target_os = "macos")]
fn preferred_api() -> i32 {
    videoio::CAP_AVFOUNDATION
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn preferred_api() -> i32 {
    videoio::CAP_V4L2
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}
