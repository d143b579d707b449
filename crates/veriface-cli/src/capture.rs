//! File-backed image source.
//!
//! Decodes a still image from disk and re-encodes it as a bounded JPEG
//! data URI, the shape the recognize endpoint expects. Oversized captures
//! are downscaled first to keep payloads small.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::path::Path;
use thiserror::Error;
use veriface_core::ImagePayload;

/// Captures wider than this are downscaled, preserving aspect ratio.
const MAX_WIDTH: u32 = 480;
/// JPEG re-encode quality.
const JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image load failed: {0}")]
    Load(String),
    #[error("image encode failed: {0}")]
    Encode(String),
}

/// Load `path` and produce the encoded payload to submit.
pub fn load_image(path: &Path) -> Result<ImagePayload, ImageError> {
    let img = image::open(path).map_err(|err| ImageError::Load(err.to_string()))?;
    let img = if img.width() > MAX_WIDTH {
        img.resize(MAX_WIDTH, u32::MAX, FilterType::Triangle)
    } else {
        img
    };
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|err| ImageError::Encode(err.to_string()))?;
    tracing::debug!(
        width = rgb.width(),
        height = rgb.height(),
        bytes = buf.len(),
        "image re-encoded"
    );
    Ok(ImagePayload::from_bytes("image/jpeg", &buf))
}
