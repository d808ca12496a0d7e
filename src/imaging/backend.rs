//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three stages every backend must
//! support: decode, resize, and encode. Each stage consumes the full output
//! of the previous one; there is no streaming between them.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend) — pure Rust, built on the
//! `image` crate. Tests swap in a recording mock.

use super::codec::EncoderKind;
use super::params::Quality;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("No encoder for format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to encode {encoder}: {message}")]
    Encode {
        encoder: EncoderKind,
        message: String,
    },
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("Output {width}x{height} exceeds the limit of {max_pixels} pixels")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
}

/// Width and height of an image or a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Decoded pixels in the canonical in-memory layout: RGBA, 8 bits per channel.
///
/// Every source container (JPEG, PNG, GIF) is normalized to this shape before
/// any transformation. The buffer is owned; dropping the value frees it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pixels: RgbaImage,
}

impl DecodedImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Build from a raw `width * height * 4` byte buffer.
    pub fn from_raw(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, rgba).map(Self::new)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Trait for image processing backends.
///
/// `Send + Sync` so a single backend can be shared by every job and moved
/// onto a blocking thread for the CPU-bound work.
pub trait ImageBackend: Send + Sync {
    /// Parse container bytes into RGBA8 pixels.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError>;

    /// Resample to exactly `width` x `height`.
    fn resize(
        &self,
        image: &DecodedImage,
        width: u32,
        height: u32,
    ) -> Result<DecodedImage, BackendError>;

    /// Serialize into the container format of `encoder`.
    fn encode(
        &self,
        image: &DecodedImage,
        encoder: EncoderKind,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}
