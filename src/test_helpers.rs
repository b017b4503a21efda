//! Shared test utilities.
//!
//! Raster builders for pixel-level assertions, a real JPEG encoder for the
//! codec tests, and a fully mocked session:
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (mut session, backend, clock) = mock_session();
//! let id = session.add_image(SourceFile::new("a.jpg", b"800x600".to_vec())).unwrap();
//! session.set_caption(id, CaptionSide::Right, "Cat").unwrap();
//! clock.advance(Duration::from_millis(300));
//! session.run_until_idle();
//! assert_eq!(backend.encodes(), 1);
//! ```

use crate::imaging::backend::tests::MockBackend;
use crate::imaging::text::tests::FixedAdvance;
use crate::schedule::ManualClock;
use crate::session::{CaptionSession, SessionSettings};
use image::{Rgba, RgbaImage};
use std::sync::Arc;

// =========================================================================
// Rasters
// =========================================================================

/// A raster filled with one color.
pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

/// A raster where every pixel differs from its neighbours, so rotations and
/// crops can be checked pixel by pixel.
pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x / 256 + y / 256) % 256) as u8, 255])
    })
}

/// Deterministic pseudo-random pixels with a fixed alpha. Noise defeats PNG
/// compression, so these encode to large files.
pub fn noise(width: u32, height: u32, alpha: u8) -> RgbaImage {
    let mut state: u32 = 0x9e37_79b9;
    RgbaImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, alpha])
    })
}

/// A real PNG of `raster`, alpha channel included.
pub fn encode_test_png(raster: &RgbaImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    raster.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// A real JPEG of a gradient raster, encoded at high quality.
pub fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let rgb = image::DynamicImage::ImageRgba8(gradient(width, height)).to_rgb8();
    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 95);
    rgb.write_with_encoder(encoder).unwrap();
    buf
}

// =========================================================================
// Sessions
// =========================================================================

/// A session on [`MockBackend`], [`FixedAdvance`] text and a [`ManualClock`].
///
/// Default caption style (96 px, 40 px padding) and schedule; the crop
/// preview is capped at 100 px so preview coordinates stay small.
pub fn mock_session() -> (CaptionSession, Arc<MockBackend>, Arc<ManualClock>) {
    let backend = Arc::new(MockBackend::new());
    let clock = Arc::new(ManualClock::new());
    let settings = SessionSettings {
        preview_max: 100,
        ..SessionSettings::default()
    };
    let session = CaptionSession::new(backend.clone(), Arc::new(FixedAdvance), settings)
        .with_clock(clock.clone());
    (session, backend, clock)
}
