//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides the output size and codec) and the
//! [`backend`](super::backend) (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`ResampleFilter`] — Resampling kernel for the resize step. Nearest-neighbor is not offered.
//! - [`ResizeParams`] — Full specification for one resize: output dimensions, codec, quality.
//! - [`DEFAULT_MAX_PIXELS`] — Cap on `width * height` of a planned output.

use super::codec::EncoderKind;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Largest output accepted by [`plan_resize`](super::operations::plan_resize).
///
/// The linear-light resize holds the output as RGBA `f32`, 16 bytes per
/// pixel, so this caps that buffer at 640 MB.
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// Quality setting for lossy image encoding (1-100).
///
/// Only JPEG consumes it; PNG and GIF are lossless apart from GIF's palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Resampling kernel applied in linear light.
///
/// All variants average over a neighbourhood of source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleFilter {
    /// Bilinear tent filter.
    Triangle,
    /// Bicubic, sharp with little ringing.
    #[default]
    CatmullRom,
    Gaussian,
    /// Sharpest, may ring on hard edges.
    Lanczos3,
}

impl ResampleFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Parameters for a single resize-and-encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub encoder: EncoderKind,
    pub quality: Quality,
}
