//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four raster operations the
//! pipeline needs: decode, encode, rotate and crop.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust on the
//! `image` crate. Backends must be `Send + Sync` because encodes run on the
//! rayon pool while the session keeps editing.

use super::params::{CropRect, EncodeParams};
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
    #[error("Encode failed: {0}")]
    EncodeFailed(String),
}

/// An immutable encoded blob produced by [`ImageBackend::encode`].
///
/// Bytes are reference-counted so handing them to a viewer or an archive
/// sink never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Arc<[u8]>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
pub trait ImageBackend: Send + Sync {
    /// Decode an encoded file into an RGBA raster.
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError>;

    /// Encode a raster into the requested format.
    fn encode(&self, raster: &RgbaImage, params: &EncodeParams)
    -> Result<EncodedImage, BackendError>;

    /// Rotate a raster a quarter turn clockwise. Output is `height × width`.
    fn rotate_cw(&self, raster: &RgbaImage) -> RgbaImage;

    /// Extract the sub-raster under `rect`. The caller guarantees `rect` lies
    /// within the raster and is not degenerate.
    fn crop(&self, raster: &RgbaImage, rect: CropRect) -> RgbaImage;
}
