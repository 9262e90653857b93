//! Synthetic frame source used when no camera is attached.

use chrono::Utc;

use crate::{
    device::{CaptureBackend, CaptureDevice, CaptureSettings, DeviceFactory},
    types::{CaptureError, Frame},
};

const SQUARE_SIZE: i32 = 48;

/// Factory producing a moving gradient with a bright square.
#[derive(Clone, Debug, Default)]
pub struct PatternFactory;

impl DeviceFactory for PatternFactory {
    fn describe(&self) -> String {
        "test pattern".to_string()
    }

    fn open(&self, _backend: CaptureBackend) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        Ok(Box::new(PatternDevice::new(CaptureSettings::default())))
    }
}

struct PatternDevice {
    width: i32,
    height: i32,
    tick: u64,
}

impl PatternDevice {
    fn new(settings: CaptureSettings) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            tick: 0,
        }
    }
}

impl CaptureDevice for PatternDevice {
    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        if settings.width <= 0 || settings.height <= 0 {
            return Err(CaptureError::Other(anyhow::anyhow!(
                "pattern size must be positive, got {}x{}",
                settings.width,
                settings.height
            )));
        }
        self.width = settings.width;
        self.height = settings.height;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.tick = self.tick.wrapping_add(1);
        let (w, h) = (self.width, self.height);
        let shift = (self.tick % 256) as i32;
        let span = (w - SQUARE_SIZE).max(1) as u64;
        let square_x = (self.tick.wrapping_mul(4) % span) as i32;
        let square_y = (h - SQUARE_SIZE).max(0) / 2;

        let mut data = Vec::with_capacity(w as usize * h as usize * 3);
        for y in 0..h {
            for x in 0..w {
                let inside = x >= square_x
                    && x < square_x + SQUARE_SIZE
                    && y >= square_y
                    && y < square_y + SQUARE_SIZE;
                if inside {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    let b = ((x * 255) / w.max(1)) as u8;
                    let g = ((y * 255) / h.max(1)) as u8;
                    let r = ((x + shift) % 256) as u8;
                    data.extend_from_slice(&[b, g, r]);
                }
            }
        }

        Frame::bgr8(data, w, h, Utc::now().timestamp_millis())
    }
}
