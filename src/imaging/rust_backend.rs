//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP, GIF) | `image::ImageReader` with guessed format |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality-tunable) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Rotate 90° | `image::imageops::rotate90` |
//! | Crop | `image::imageops::crop_imm` |

use super::backend::{BackendError, EncodedImage, ImageBackend};
use super::params::{CropRect, EncodeParams, OutputFormat};
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("bmp", ImageFormat::Bmp),
    ("gif", ImageFormat::Gif),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether `path` has one of the [`supported_input_extensions`].
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// MIME type sniffed from the leading bytes, `application/octet-stream` if unknown.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode as JPEG. JPEG has no alpha channel, so the raster is flattened to RGB.
fn encode_jpeg(raster: &RgbaImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let rgb = DynamicImage::ImageRgba8(raster.clone()).to_rgb8();
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BackendError::EncodeFailed(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| BackendError::EncodeFailed(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .decode()
            .map_err(|e| BackendError::DecodeFailed(e.to_string()))?;
        Ok(img.to_rgba8())
    }

    fn encode(
        &self,
        raster: &RgbaImage,
        params: &EncodeParams,
    ) -> Result<EncodedImage, BackendError> {
        let bytes = match params.format {
            OutputFormat::Jpeg => encode_jpeg(raster, params.quality.value() as u8)?,
            OutputFormat::Png => encode_png(raster)?,
        };
        Ok(EncodedImage {
            bytes: Arc::from(bytes),
            mime: params.format.mime_type(),
            width: raster.width(),
            height: raster.height(),
        })
    }

    fn rotate_cw(&self, raster: &RgbaImage) -> RgbaImage {
        image::imageops::rotate90(raster)
    }

    fn crop(&self, raster: &RgbaImage, rect: CropRect) -> RgbaImage {
        image::imageops::crop_imm(raster, rect.x, rect.y, rect.width, rect.height).to_image()
    }
}
