//! Text measurement and glyph rasterization.
//!
//! Caption layout only needs a width for a candidate string; compositing
//! needs to paint a single line anchored left or right and vertically
//! centered on a given y. Both go through [`TextRenderer`] so layout stays
//! testable with synthetic metrics.
//!
//! [`FontRenderer`] is the production implementation on `ab_glyph`: the font
//! is scaled so one em equals `font_size` pixels, kerning is applied between
//! adjacent glyphs, and glyph coverage is alpha-blended onto the canvas.

use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Well-known locations of a sans-serif face, tried in order when no font is
/// configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("not a usable font file: {0}")]
    Invalid(String),
    #[error("no font configured and none of the known system fonts exist")]
    NotFound,
}

/// Horizontal anchoring of a caption line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    /// The line starts at the anchor x.
    Left,
    /// The line ends at the anchor x.
    Right,
}

/// Where a single line of text is placed on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextAnchor {
    pub x: f32,
    /// Vertical center of the line's em box.
    pub center_y: f32,
    pub align: Align,
}

/// Text measurement plus single-line painting.
pub trait TextRenderer: Send + Sync {
    /// Advance width of `text` in pixels at `font_size`.
    fn measure(&self, text: &str, font_size: f32) -> f32;

    /// Paint one line of `text` onto `canvas`. Pixels falling outside the
    /// canvas are dropped.
    fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        font_size: f32,
        anchor: TextAnchor,
        color: Rgba<u8>,
    );
}

/// `ab_glyph`-backed renderer.
#[derive(Clone)]
pub struct FontRenderer {
    font: FontArc,
}

impl std::fmt::Debug for FontRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontRenderer").finish_non_exhaustive()
    }
}

impl FontRenderer {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FontError> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| FontError::Invalid(e.to_string()))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self, FontError> {
        let bytes = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(bytes)
            .map_err(|_| FontError::Invalid(path.display().to_string()))
    }

    /// First readable font among the well-known system locations.
    pub fn system_default() -> Result<Self, FontError> {
        SYSTEM_FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .filter(|p| p.exists())
            .find_map(|p| Self::from_file(p).ok())
            .ok_or(FontError::NotFound)
    }

    /// Load `path` when given, otherwise fall back to [`Self::system_default`].
    pub fn load(path: Option<&Path>) -> Result<Self, FontError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::system_default(),
        }
    }

    /// Scale at which one em spans `font_size` pixels.
    fn scale(&self, font_size: f32) -> PxScale {
        let upem = self.font.units_per_em().unwrap_or(1000.0);
        PxScale::from(font_size * self.font.height_unscaled() / upem)
    }

    /// Glyph ids with their x offsets from the line start, plus total advance.
    fn layout(&self, text: &str, scale: PxScale) -> (Vec<(GlyphId, f32)>, f32) {
        let scaled = self.font.as_scaled(scale);
        let mut glyphs = Vec::with_capacity(text.len());
        let mut cursor_x = 0.0f32;
        let mut last: Option<GlyphId> = None;

        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(prev) = last {
                cursor_x += scaled.kern(prev, id);
            }
            glyphs.push((id, cursor_x));
            cursor_x += scaled.h_advance(id);
            last = Some(id);
        }

        (glyphs, cursor_x)
    }
}

/// Blend `color` over `dst` with the given coverage (0..=1).
fn blend(dst: &mut Rgba<u8>, color: Rgba<u8>, coverage: f32) {
    let a = (coverage.clamp(0.0, 1.0) * color[3] as f32 / 255.0).clamp(0.0, 1.0);
    for c in 0..3 {
        let src = color[c] as f32;
        let out = dst[c] as f32;
        dst[c] = (src * a + out * (1.0 - a)).round() as u8;
    }
    dst[3] = dst[3].max((a * 255.0).round() as u8);
}

impl TextRenderer for FontRenderer {
    fn measure(&self, text: &str, font_size: f32) -> f32 {
        self.layout(text, self.scale(font_size)).1
    }

    fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        font_size: f32,
        anchor: TextAnchor,
        color: Rgba<u8>,
    ) {
        let scale = self.scale(font_size);
        let scaled = self.font.as_scaled(scale);
        let (glyphs, width) = self.layout(text, scale);

        let start_x = match anchor.align {
            Align::Left => anchor.x,
            Align::Right => anchor.x - width,
        };
        // descent is negative in ab_glyph
        let baseline = anchor.center_y + (scaled.ascent() + scaled.descent()) / 2.0;

        let (cw, ch) = canvas.dimensions();
        for (id, gx) in glyphs {
            let glyph = id.with_scale_and_position(scale, point(start_x + gx, baseline));
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                let x = bounds.min.x as i64 + px as i64;
                let y = bounds.min.y as i64 + py as i64;
                if x >= 0 && y >= 0 && (x as u32) < cw && (y as u32) < ch {
                    blend(canvas.get_pixel_mut(x as u32, y as u32), color, coverage);
                }
            });
        }
    }
}
