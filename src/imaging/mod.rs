//! Image processing — pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Select codec** | [`select_encoder`] extension table |
//! | **Decode** | `image::ImageReader` → RGBA8 |
//! | **Resize** | max-fit dimensions, companded `imageops::resize` |
//! | **Encode** | `image` PNG / GIF / JPEG encoders |
//!
//! The module is split into:
//! - **Codec**: [`EncoderKind`] and the extension → encoder table
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod codec;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, DecodedImage, Dimensions, ImageBackend};
pub use calculations::calculate_fit_dimensions;
pub use codec::{EncoderKind, select_encoder, supported_extensions};
pub use operations::{EncodedImage, plan_resize, resize_and_encode};
pub use params::{DEFAULT_MAX_PIXELS, Quality, ResampleFilter, ResizeParams};
pub use rust_backend::RustBackend;
