//! Pre-ingest compression of oversized source files.
//!
//! Phone cameras produce files far larger than a caption band needs. Before
//! decoding, each source above a byte threshold is downscaled so its longest
//! edge fits `max_dimension` and re-encoded as JPEG under a `.jpg` name. The
//! compressed file is kept only if it is actually smaller. Sources with any
//! transparency are left alone, since JPEG has no alpha channel.
//!
//! Compression is best effort: the session logs a failure and carries on
//! with the original bytes.

use crate::imaging::calculations::fit_within;
use crate::imaging::{BackendError, EncodeParams, ImageBackend, OutputFormat, Quality};
use crate::item::SourceFile;
use crate::naming::file_stem;
use image::imageops::FilterType;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("{0} has no bytes to compress")]
    NoBytes(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Shrinks a source file before it is decoded for editing.
pub trait Compressor: Send + Sync {
    fn compress(&self, source: &SourceFile) -> Result<SourceFile, CompressError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    /// Files at or below this size pass through untouched.
    pub threshold_bytes: u64,
    pub max_dimension: u32,
    pub quality: Quality,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            threshold_bytes: 2048 * 1024,
            max_dimension: 4096,
            quality: Quality::new(85),
        }
    }
}

/// Downscale-and-reencode compressor on an [`ImageBackend`].
pub struct DownscaleCompressor {
    backend: Arc<dyn ImageBackend>,
    settings: CompressionSettings,
}

impl DownscaleCompressor {
    pub fn new(backend: Arc<dyn ImageBackend>, settings: CompressionSettings) -> Self {
        Self { backend, settings }
    }
}

impl Compressor for DownscaleCompressor {
    fn compress(&self, source: &SourceFile) -> Result<SourceFile, CompressError> {
        let bytes = source
            .bytes
            .as_ref()
            .ok_or_else(|| CompressError::NoBytes(source.filename.clone()))?;
        if bytes.len() as u64 <= self.settings.threshold_bytes {
            return Ok(source.clone());
        }

        let raster = self.backend.decode(bytes)?;
        if raster.pixels().any(|p| p[3] < u8::MAX) {
            tracing::debug!(file = %source.filename, "source has transparency, not compressed");
            return Ok(source.clone());
        }
        let (w, h) = fit_within(raster.dimensions(), self.settings.max_dimension);
        let scaled = if (w, h) == raster.dimensions() {
            raster
        } else {
            image::imageops::resize(&raster, w, h, FilterType::Lanczos3)
        };
        let encoded = self.backend.encode(
            &scaled,
            &EncodeParams {
                format: OutputFormat::Jpeg,
                quality: self.settings.quality,
            },
        )?;

        if encoded.bytes.len() < bytes.len() {
            tracing::debug!(
                file = %source.filename,
                before = bytes.len(),
                after = encoded.bytes.len(),
                "compressed source"
            );
            Ok(SourceFile {
                filename: format!("{}.jpg", file_stem(&source.filename)),
                bytes: Some(encoded.bytes),
            })
        } else {
            Ok(source.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::sniff_mime;
    use crate::test_helpers::{encode_test_jpeg, encode_test_png, noise};

    #[test]
    fn small_files_pass_through() {
        let backend = Arc::new(MockBackend::new());
        let compressor = DownscaleCompressor::new(backend.clone(), CompressionSettings::default());
        let source = SourceFile::new("a.jpg", b"40x30".to_vec());
        assert_eq!(compressor.compress(&source).unwrap(), source);
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn larger_result_keeps_original() {
        let backend = Arc::new(MockBackend::new());
        let compressor = DownscaleCompressor::new(
            backend.clone(),
            CompressionSettings {
                threshold_bytes: 0,
                max_dimension: 10,
                quality: Quality::new(60),
            },
        );
        // mock output "jpg:10x8" is longer than "40x30"
        let source = SourceFile::new("a.jpg", b"40x30".to_vec());
        assert_eq!(compressor.compress(&source).unwrap(), source);
        assert!(backend.get_operations().contains(&RecordedOp::Encode {
            width: 10,
            height: 8,
            quality: 60
        }));
    }

    #[test]
    fn missing_bytes_is_an_error() {
        let compressor =
            DownscaleCompressor::new(Arc::new(MockBackend::new()), CompressionSettings::default());
        assert!(matches!(
            compressor.compress(&SourceFile::named("x.jpg")),
            Err(CompressError::NoBytes(_))
        ));
    }

    #[test]
    fn undecodable_source_is_an_error() {
        let compressor = DownscaleCompressor::new(
            Arc::new(MockBackend::new()),
            CompressionSettings {
                threshold_bytes: 0,
                ..CompressionSettings::default()
            },
        );
        let result = compressor.compress(&SourceFile::new("x.jpg", b"garbage".to_vec()));
        assert!(matches!(result, Err(CompressError::Backend(_))));
    }

    #[test]
    fn real_jpeg_is_downscaled() {
        let backend = Arc::new(RustBackend::new());
        let original = encode_test_jpeg(640, 480);
        let compressor = DownscaleCompressor::new(
            backend.clone(),
            CompressionSettings {
                threshold_bytes: 1024,
                max_dimension: 64,
                quality: Quality::new(50),
            },
        );
        let out = compressor
            .compress(&SourceFile::new("big.jpg", original.clone()))
            .unwrap();
        let bytes = out.bytes.unwrap();
        assert!(bytes.len() < original.len());
        assert_eq!(out.filename, "big.jpg");
        assert_eq!(backend.decode(&bytes).unwrap().dimensions(), (64, 48));
    }

    fn small_limits() -> CompressionSettings {
        CompressionSettings {
            threshold_bytes: 1024,
            max_dimension: 100,
            quality: Quality::new(80),
        }
    }

    #[test]
    fn opaque_png_becomes_jpg() {
        let backend = Arc::new(RustBackend::new());
        let png = encode_test_png(&noise(300, 200, 255));
        let compressor = DownscaleCompressor::new(backend.clone(), small_limits());
        let out = compressor
            .compress(&SourceFile::new("photo.png", png.clone()))
            .unwrap();
        let bytes = out.bytes.unwrap();
        assert_eq!(out.filename, "photo.jpg");
        assert_eq!(sniff_mime(&bytes), "image/jpeg");
        assert!(bytes.len() < png.len());
        assert_eq!(backend.decode(&bytes).unwrap().dimensions(), (100, 67));
    }

    #[test]
    fn transparent_png_is_left_alone() {
        let png = encode_test_png(&noise(300, 200, 100));
        let compressor = DownscaleCompressor::new(Arc::new(RustBackend::new()), small_limits());
        let source = SourceFile::new("logo.png", png);
        assert_eq!(compressor.compress(&source).unwrap(), source);
    }
}
