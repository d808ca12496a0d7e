//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take a target box and codec, compute parameters, and call the backend.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::calculate_fit_dimensions;
use super::codec::EncoderKind;
use super::params::{Quality, ResizeParams};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Bytes produced by [`resize_and_encode`] plus what they contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoder: EncoderKind,
}

/// Plan a resize without decoding anything.
///
/// Fails with [`BackendError::TooLarge`] when the fitted output would have
/// more than `max_pixels` pixels, so nothing is allocated for it.
pub fn plan_resize(
    source: Dimensions,
    target: Dimensions,
    encoder: EncoderKind,
    quality: Quality,
    max_pixels: u64,
) -> Result<ResizeParams> {
    for dims in [source, target] {
        if dims.width == 0 || dims.height == 0 {
            return Err(BackendError::InvalidDimensions {
                width: dims.width,
                height: dims.height,
            });
        }
    }
    let (width, height) = calculate_fit_dimensions(source.as_tuple(), target.as_tuple());
    if u64::from(width) * u64::from(height) > max_pixels {
        return Err(BackendError::TooLarge {
            width,
            height,
            max_pixels,
        });
    }
    Ok(ResizeParams {
        width,
        height,
        encoder,
        quality,
    })
}

/// Decode `raw_bytes`, fit them into `target`, and encode with `encoder`.
///
/// [`EncoderKind::Unsupported`] is rejected before any decoding. The decoded
/// and resized buffers are locals of this call and are dropped on every
/// return path.
pub fn resize_and_encode(
    backend: &dyn ImageBackend,
    raw_bytes: &[u8],
    target: Dimensions,
    encoder: EncoderKind,
    quality: Quality,
    max_pixels: u64,
) -> Result<EncodedImage> {
    if !encoder.is_supported() {
        return Err(BackendError::UnsupportedFormat(encoder.to_string()));
    }

    let decoded = backend.decode(raw_bytes)?;
    let params = plan_resize(decoded.dimensions(), target, encoder, quality, max_pixels)?;
    let resized = backend.resize(&decoded, params.width, params.height)?;
    drop(decoded);
    let bytes = backend.encode(&resized, params.encoder, params.quality)?;

    Ok(EncodedImage {
        bytes,
        width: params.width,
        height: params.height,
        encoder,
    })
}
