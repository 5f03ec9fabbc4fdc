use common::domain::{DomainError, DomainResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

/// Target resolution every frame is scaled to before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::new(320, 240)
    }
}

/// Decode compressed image bytes and scale them to `geometry`.
///
/// CPU-bound; async callers go through [`prepare_frame_blocking`].
pub fn prepare_frame(bytes: &[u8], geometry: FrameGeometry) -> DomainResult<RgbImage> {
    if bytes.is_empty() {
        return Err(DomainError::FrameDecodeError("empty payload".to_string()));
    }

    let rgb = image::load_from_memory(bytes)
        .map_err(|e| DomainError::FrameDecodeError(e.to_string()))?
        .into_rgb8();

    if rgb.dimensions() == (geometry.width, geometry.height) {
        return Ok(rgb);
    }

    Ok(image::imageops::resize(
        &rgb,
        geometry.width,
        geometry.height,
        FilterType::Triangle,
    ))
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> DomainResult<Vec<u8>> {
    let mut out = Vec::new();
    frame
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .map_err(|e| DomainError::FrameEncodeError(e.to_string()))?;
    Ok(out)
}

pub async fn prepare_frame_blocking(
    bytes: Vec<u8>,
    geometry: FrameGeometry,
) -> DomainResult<RgbImage> {
    tokio::task::spawn_blocking(move || prepare_frame(&bytes, geometry))
        .await
        .map_err(|e| DomainError::FrameDecodeError(format!("decode task failed: {e}")))?
}

pub async fn encode_jpeg_blocking(frame: RgbImage, quality: u8) -> DomainResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
        .await
        .map_err(|e| DomainError::FrameEncodeError(format!("encode task failed: {e}")))?
}
