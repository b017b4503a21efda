//! Caption band compositing and asynchronous encoding.
//!
//! A composite is the base raster with a black band appended underneath:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │                              │
//! │          base raster         │  base.height
//! │                              │
//! ├──────────────────────────────┤
//! │ left caption   right caption │  max(lines) * font_size + 2 * padding
//! └──────────────────────────────┘
//! ```
//!
//! Left lines are anchored at `padding`, right lines end at
//! `width - padding`, and each column is vertically centered in the band as
//! a block. Drawing is synchronous and cheap next to encoding, which runs on
//! the rayon pool through [`EncodeQueue`] and reports back over a channel.

use crate::imaging::calculations::{band_height, column_width, line_centers, output_dimensions};
use crate::imaging::{
    Align, BackendError, EncodeParams, EncodedImage, ImageBackend, TextAnchor, TextRenderer,
};
use crate::layout::wrap_caption;
use crate::registry::ItemId;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BAND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Caption typography in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionStyle {
    pub font_size: u32,
    pub padding: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: 96,
            padding: 40,
        }
    }
}

/// Wrapped caption lines for both columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionLayout {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

/// Lays out and draws caption bands.
#[derive(Clone)]
pub struct Compositor {
    renderer: Arc<dyn TextRenderer>,
    style: CaptionStyle,
}

impl Compositor {
    pub fn new(renderer: Arc<dyn TextRenderer>, style: CaptionStyle) -> Self {
        Self { renderer, style }
    }

    pub fn style(&self) -> CaptionStyle {
        self.style
    }

    /// Wrap both captions for a raster `width` pixels wide.
    pub fn layout(&self, width: u32, left: &str, right: &str) -> CaptionLayout {
        let both = !left.is_empty() && !right.is_empty();
        let max_width = column_width(width, self.style.padding, both);
        let font_size = self.style.font_size as f32;
        let measure = |s: &str| self.renderer.measure(s, font_size);
        CaptionLayout {
            left: wrap_caption(left, max_width, measure),
            right: wrap_caption(right, max_width, measure),
        }
    }

    /// Lay out and composite in one step.
    pub fn render(&self, base: &RgbaImage, left: &str, right: &str) -> RgbaImage {
        let layout = self.layout(base.width(), left, right);
        self.compose(base, &layout)
    }

    /// Composite `base` with a caption band holding `layout`.
    #[tracing::instrument(skip_all, fields(width = base.width(), height = base.height()))]
    pub fn compose(&self, base: &RgbaImage, layout: &CaptionLayout) -> RgbaImage {
        let CaptionStyle { font_size, padding } = self.style;
        let band = band_height(layout.left.len(), layout.right.len(), font_size, padding);
        let (width, height) = output_dimensions(base.dimensions(), band);
        let band_top = base.height();

        let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
        image::imageops::overlay(&mut canvas, base, 0, 0);
        for y in band_top..height {
            for x in 0..width {
                canvas.put_pixel(x, y, BAND);
            }
        }

        let columns = [
            (&layout.left, padding as f32, Align::Left),
            (&layout.right, width as f32 - padding as f32, Align::Right),
        ];
        for (lines, x, align) in columns {
            let centers = line_centers(band_top, band, lines.len(), font_size);
            for (line, center_y) in lines.iter().zip(centers) {
                if line.is_empty() {
                    continue;
                }
                self.renderer.draw_line(
                    &mut canvas,
                    line,
                    font_size as f32,
                    TextAnchor { x, center_y, align },
                    TEXT,
                );
            }
        }

        canvas
    }
}

/// A composite waiting to be encoded.
pub struct EncodeJob {
    pub item: ItemId,
    pub generation: u64,
    pub raster: RgbaImage,
}

/// Completion of an [`EncodeJob`].
pub struct EncodeDone {
    pub item: ItemId,
    pub generation: u64,
    pub result: Result<EncodedImage, BackendError>,
}

/// Encodes composites on the rayon pool without blocking the caller.
pub struct EncodeQueue {
    backend: Arc<dyn ImageBackend>,
    params: EncodeParams,
    tx: Sender<EncodeDone>,
    rx: Receiver<EncodeDone>,
    in_flight: usize,
}

impl EncodeQueue {
    pub fn new(backend: Arc<dyn ImageBackend>, params: EncodeParams) -> Self {
        let (tx, rx) = channel();
        Self {
            backend,
            params,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn submit(&mut self, job: EncodeJob) {
        let backend = Arc::clone(&self.backend);
        let params = self.params;
        let tx = self.tx.clone();
        self.in_flight += 1;
        rayon::spawn(move || {
            let result = backend.encode(&job.raster, &params);
            // The receiver lives as long as the queue; a closed channel just
            // means the session was dropped mid-encode.
            let _ = tx.send(EncodeDone {
                item: job.item,
                generation: job.generation,
                result,
            });
        });
    }

    /// Completed encodes, without waiting.
    pub fn try_collect(&mut self) -> Vec<EncodeDone> {
        let done: Vec<EncodeDone> = self.rx.try_iter().collect();
        self.in_flight -= done.len();
        done
    }

    /// Block until the next encode completes. `None` when nothing is in flight.
    pub fn wait(&mut self) -> Option<EncodeDone> {
        if self.in_flight == 0 {
            return None;
        }
        let done = self.rx.recv().ok()?;
        self.in_flight -= 1;
        Some(done)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
