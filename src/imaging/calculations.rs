//! Pure calculation functions for caption geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::CropRect;

/// Height of the caption band below the image.
///
/// Always reserves at least one line so an image with empty captions still
/// gets a band. Saturates at `u32::MAX`:
///
/// `max(left_lines, right_lines, 1) * font_size + 2 * padding`
///
/// # Examples
/// ```
/// # use caption_band::imaging::calculations::band_height;
/// // One line of 96px text with 40px padding → 176px band
/// assert_eq!(band_height(0, 1, 96, 40), 176);
/// ```
pub fn band_height(left_lines: usize, right_lines: usize, font_size: u32, padding: u32) -> u32 {
    let lines = u32::try_from(left_lines.max(right_lines).max(1)).unwrap_or(u32::MAX);
    lines
        .saturating_mul(font_size)
        .saturating_add(padding.saturating_mul(2))
}

/// Dimensions of the composited output: same width, base height plus band.
///
/// Saturates instead of wrapping.
pub fn output_dimensions(base: (u32, u32), band_height: u32) -> (u32, u32) {
    (base.0, base.1.saturating_add(band_height))
}

/// Dimensions after a quarter turn (width and height swap).
pub fn rotated_dimensions(dims: (u32, u32)) -> (u32, u32) {
    (dims.1, dims.0)
}

/// Maximum pixel width a caption column may occupy.
///
/// With both captions present the band is split into two columns with a
/// `padding` gutter between them; a lone caption gets the full inner width.
/// Never returns less than 1.
pub fn column_width(width: u32, padding: u32, both_columns: bool) -> f32 {
    let width = width as f32;
    let padding = padding as f32;
    let available = if both_columns {
        (width - 3.0 * padding) / 2.0
    } else {
        width - 2.0 * padding
    };
    available.max(1.0)
}

/// Vertical center of every line in a column block centered within the band.
///
/// Lines are spaced `font_size` apart and the block's center coincides with
/// the band's center.
pub fn line_centers(band_top: u32, band_height: u32, lines: usize, font_size: u32) -> Vec<f32> {
    let font_size = font_size as f32;
    let block = lines as f32 * font_size;
    let block_top = band_top as f32 + (band_height as f32 - block) / 2.0;
    (0..lines)
        .map(|i| block_top + (i as f32 + 0.5) * font_size)
        .collect()
}

/// Fit `dims` inside a `max × max` box, preserving aspect ratio.
///
/// Never upscales and never returns a zero dimension.
pub fn fit_within(dims: (u32, u32), max: u32) -> (u32, u32) {
    let (w, h) = dims;
    let longest = w.max(h);
    if longest <= max || longest == 0 {
        return (w.max(1), h.max(1));
    }
    let scale = max as f64 / longest as f64;
    let fw = ((w as f64 * scale).round() as u32).max(1);
    let fh = ((h as f64 * scale).round() as u32).max(1);
    (fw, fh)
}

/// A rectangle in display (preview) coordinates, as floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    /// Normalized rectangle spanned by two corner points in any order.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            x: a.0.min(b.0),
            y: a.1.min(b.1),
            width: (a.0 - b.0).abs(),
            height: (a.1 - b.1).abs(),
        }
    }
}

/// Scale a display-space rectangle into source-raster space.
///
/// Each axis is scaled independently by `source / display`, rounded to whole
/// pixels and clamped to the source bounds. The result may be degenerate.
pub fn scale_to_source(rect: DisplayRect, display: (u32, u32), source: (u32, u32)) -> CropRect {
    let sx = source.0 as f32 / display.0.max(1) as f32;
    let sy = source.1 as f32 / display.1.max(1) as f32;

    let x0 = (rect.x * sx).round().max(0.0) as u32;
    let y0 = (rect.y * sy).round().max(0.0) as u32;
    let x1 = ((rect.x + rect.width) * sx).round().max(0.0) as u32;
    let y1 = ((rect.y + rect.height) * sy).round().max(0.0) as u32;

    CropRect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)).clamp_to(source.0, source.1)
}
