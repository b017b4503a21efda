//! Raster operations and text rendering in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (format sniffed from bytes) |
//! | **Encode** | JPEG (quality-tunable) or PNG via `image` codecs |
//! | **Rotate / crop** | `imageops::rotate90`, `imageops::crop_imm` |
//! | **Text** | `ab_glyph` metrics + coverage rasterization |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for band and crop geometry (unit testable)
//! - **Parameters**: Data structures describing encodes and crops
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Text**: [`TextRenderer`] trait + [`FontRenderer`]

pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;
pub mod text;

pub use backend::{BackendError, EncodedImage, ImageBackend};
pub use params::{CropRect, EncodeParams, OutputFormat, Quality};
pub use rust_backend::{RustBackend, is_supported_image, sniff_mime, supported_input_extensions};
pub use text::{Align, FontError, FontRenderer, TextAnchor, TextRenderer};
