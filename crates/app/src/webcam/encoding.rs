//! JPEG encoding for the preview stream and the recognition payload.

use anyhow::{Result, anyhow, bail};
use image::{ImageBuffer, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use video_ingest::{Frame, FrameFormat};

/// Convert a captured BGR frame into an RGB image buffer.
pub(crate) fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    if !matches!(frame.format, FrameFormat::Bgr8) {
        bail!("unsupported frame format");
    }
    let width = u32::try_from(frame.width).map_err(|_| anyhow!("negative frame width"))?;
    let height = u32::try_from(frame.height).map_err(|_| anyhow!("negative frame height"))?;
    let mut rgb = Vec::with_capacity(frame.data.len());
    for chunk in frame.data.chunks_exact(3) {
        rgb.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
    }
    ImageBuffer::<Rgb<u8>, Vec<u8>>::from_vec(width, height, rgb)
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))
}

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

/// Encode the raw frame for the recognition service. Quality is usually
/// lower than the preview to keep request latency down.
pub(crate) fn encode_frame_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    encode_jpeg(&frame_to_rgb(frame)?, quality)
}
