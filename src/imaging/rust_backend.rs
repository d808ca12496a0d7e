//! Pure Rust image processing backend — zero system dependencies.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF) | `image::ImageReader` with guessed format → RGBA8 |
//! | Resize | sRGB → linear `f32`, premultiplied; `image::imageops::resize`; back to sRGB |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → GIF | `image::codecs::gif::GifEncoder` (NeuQuant palette) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the configured quality |
//!
//! ## Companding
//!
//! 8-bit pixel values are gamma encoded. Averaging them directly darkens
//! fine detail and leaves dark halos around bright edges on downscale, so
//! the resize runs on linear-light, alpha-premultiplied `f32` samples and
//! converts back afterwards. Premultiplying keeps the colour of fully
//! transparent pixels from bleeding into their neighbours.

use super::backend::{BackendError, DecodedImage, ImageBackend};
use super::codec::EncoderKind;
use super::params::{Quality, ResampleFilter};
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, Rgba, Rgba32FImage,
    RgbaImage,
};
use std::io::Cursor;
use std::sync::LazyLock;

/// Containers the decoder accepts. Others are rejected even if `image`
/// could parse them.
const DECODABLE_FORMATS: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Gif, ImageFormat::Jpeg];

static SRGB_TO_LINEAR: LazyLock<[f32; 256]> =
    LazyLock::new(|| std::array::from_fn(|i| srgb_to_linear(i as f32 / 255.0)));

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn unit_to_u8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Gamma-encoded RGBA8 → premultiplied linear RGBA32F.
fn expand(image: &RgbaImage) -> Rgba32FImage {
    let lut = &*SRGB_TO_LINEAR;
    Rgba32FImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        let alpha = a as f32 / 255.0;
        Rgba([
            lut[r as usize] * alpha,
            lut[g as usize] * alpha,
            lut[b as usize] * alpha,
            alpha,
        ])
    })
}

/// Premultiplied linear RGBA32F → gamma-encoded RGBA8.
fn compress(image: &Rgba32FImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        let alpha = a.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let channel = |c: f32| unit_to_u8(linear_to_srgb((c / alpha).clamp(0.0, 1.0)));
        Rgba([channel(r), channel(g), channel(b), unit_to_u8(alpha)])
    })
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustBackend {
    filter: ResampleFilter,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: ResampleFilter) -> Self {
        Self { filter }
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        match reader.format() {
            Some(format) if DECODABLE_FORMATS.contains(&format) => {}
            Some(format) => {
                return Err(BackendError::Decode(format!(
                    "unsupported container {format:?}"
                )));
            }
            None => return Err(BackendError::Decode("unrecognized container".into())),
        }

        let image = reader
            .decode()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(DecodedImage::new(image.into_rgba8()))
    }

    fn resize(
        &self,
        image: &DecodedImage,
        width: u32,
        height: u32,
    ) -> Result<DecodedImage, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidDimensions { width, height });
        }
        let linear = expand(image.as_rgba());
        let resized = image::imageops::resize(&linear, width, height, self.filter.filter_type());
        Ok(DecodedImage::new(compress(&resized)))
    }

    fn encode(
        &self,
        image: &DecodedImage,
        encoder: EncoderKind,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        let rgba = image.as_rgba();
        let (width, height) = rgba.dimensions();
        let mut bytes = Vec::new();

        let written = match encoder {
            EncoderKind::Png => PngEncoder::new(&mut bytes).write_image(
                rgba.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            ),
            EncoderKind::Gif => {
                // The GIF trailer is written when the encoder drops.
                let mut gif = GifEncoder::new(&mut bytes);
                gif.encode(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
            }
            EncoderKind::Jpeg => {
                // JPEG has no alpha channel; it is discarded.
                let rgb = DynamicImage::ImageRgba8(rgba.clone()).into_rgb8();
                JpegEncoder::new_with_quality(&mut bytes, quality.value()).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )
            }
            EncoderKind::Unsupported => {
                return Err(BackendError::UnsupportedFormat(encoder.to_string()));
            }
        };

        written.map_err(|e| BackendError::Encode {
            encoder,
            message: e.to_string(),
        })?;
        Ok(bytes)
    }
}
