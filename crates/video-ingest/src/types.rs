use anyhow::Error;
use thiserror::Error;

/// Raw BGR frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
    /// Set once the columns have been flipped for display.
    pub mirrored: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?} with {backend} backend")]
    Open { uri: String, backend: &'static str },
    #[error("video source returned an empty frame")]
    EmptyRead,
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error(transparent)]
    Other(#[from] Error),
}

impl Frame {
    /// Wrap a tightly packed BGR8 buffer, checking its length against the
    /// stated dimensions.
    pub fn bgr8(
        data: Vec<u8>,
        width: i32,
        height: i32,
        timestamp_ms: i64,
    ) -> Result<Self, CaptureError> {
        let expected = width.max(0) as usize * height.max(0) as usize * 3;
        if data.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Bgr8,
            mirrored: false,
        })
    }

    /// Flip the frame left to right so the preview reads like a mirror.
    ///
    /// Frames remember that they were flipped; calling this again leaves the
    /// pixels untouched.
    pub fn mirror_horizontal(&mut self) {
        if self.mirrored {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let width = self.width.max(0) as usize;
        let row_len = width * bpp;
        if row_len == 0 {
            self.mirrored = true;
            return;
        }
        for row in self.data.chunks_exact_mut(row_len) {
            for x in 0..width / 2 {
                let left = x * bpp;
                let right = (width - 1 - x) * bpp;
                for channel in 0..bpp {
                    row.swap(left + channel, right + channel);
                }
            }
        }
        self.mirrored = true;
    }
}
