//! Rotation and crop state for one image.
//!
//! ## Rotation
//!
//! The angle cycles `0 → 90 → 180 → 270 → 0`. Every angle visited since the
//! last crop is kept in a four-slot cache, so revisiting an angle is a
//! pointer swap. A missing angle is derived by rotating the *current* raster
//! a quarter turn clockwise, never by re-rotating the source from scratch,
//! so a full cycle costs at most three raster transforms and the fourth
//! rotation lands back on the very allocation the cycle started from.
//!
//! ## Crop
//!
//! A crop cuts the current raster and makes the result the new native
//! orientation: the angle resets to 0 and the cache is reseeded with only the
//! cropped raster. Subsequent rotations compose on top of it.
//!
//! Cropping is driven by a [`CropSession`], which works on a downscaled
//! preview and maps the user's two points back into source pixels.

use crate::imaging::calculations::{DisplayRect, fit_within, rotated_dimensions, scale_to_source};
use crate::imaging::{CropRect, ImageBackend};
use image::RgbaImage;
use image::imageops::FilterType;
use std::sync::Arc;

/// A shared, immutable raster.
pub type Raster = Arc<RgbaImage>;

/// Clockwise rotation relative to the item's native orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn next(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    pub fn degrees(self) -> u16 {
        self.index() as u16 * 90
    }

    /// Cache slot: `degrees / 90`.
    pub fn index(self) -> usize {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 1,
            Rotation::Deg180 => 2,
            Rotation::Deg270 => 3,
        }
    }
}

/// What [`TransformStore::rotate`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The target angle was cached; no pixels were touched.
    Cached,
    /// A new raster was derived and cached.
    Derived,
}

/// Owns an item's source raster, current raster, angle and rotation cache.
#[derive(Debug, Clone)]
pub struct TransformStore {
    original: Raster,
    current: Raster,
    angle: Rotation,
    cache: [Option<Raster>; 4],
}

impl TransformStore {
    pub fn new(original: RgbaImage) -> Self {
        let original = Arc::new(original);
        Self {
            current: Arc::clone(&original),
            cache: [Some(Arc::clone(&original)), None, None, None],
            original,
            angle: Rotation::Deg0,
        }
    }

    /// The decoded source, untouched by rotation or crop.
    pub fn original(&self) -> &Raster {
        &self.original
    }

    /// The raster used as the compositing base.
    pub fn current(&self) -> &Raster {
        &self.current
    }

    pub fn angle(&self) -> Rotation {
        self.angle
    }

    /// Number of angles currently cached.
    pub fn cached_angles(&self) -> usize {
        self.cache.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn cached(&self, angle: Rotation) -> Option<&Raster> {
        self.cache[angle.index()].as_ref()
    }

    /// Advance the angle by 90° clockwise.
    pub fn rotate(&mut self, backend: &dyn ImageBackend) -> RotateOutcome {
        let target = self.angle.next();
        let outcome = match &self.cache[target.index()] {
            Some(raster) => {
                self.current = Arc::clone(raster);
                RotateOutcome::Cached
            }
            None => {
                let derived = Arc::new(backend.rotate_cw(&self.current));
                debug_assert_eq!(
                    derived.dimensions(),
                    rotated_dimensions(self.current.dimensions()),
                    "backend rotation must swap width and height"
                );
                self.cache[target.index()] = Some(Arc::clone(&derived));
                self.current = derived;
                RotateOutcome::Derived
            }
        };
        self.angle = target;
        outcome
    }

    /// Cut `rect` out of the current raster.
    ///
    /// The rectangle is clamped to the raster first. Returns `false` (and
    /// changes nothing) when the clamped rectangle has no area.
    pub fn apply_crop(&mut self, rect: CropRect, backend: &dyn ImageBackend) -> bool {
        let rect = rect.clamp_to(self.current.width(), self.current.height());
        if rect.is_degenerate() {
            return false;
        }
        let cropped = Arc::new(backend.crop(&self.current, rect));
        self.cache = [Some(Arc::clone(&cropped)), None, None, None];
        self.current = cropped;
        self.angle = Rotation::Deg0;
        true
    }

    /// Start a crop session over the current raster.
    pub fn begin_crop(&self, preview_max: u32, mode: CropMode) -> CropSession {
        CropSession::new(&self.current, preview_max, mode)
    }
}

/// How the second corner of a crop selection is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropMode {
    /// Two separate presses mark opposite corners.
    #[default]
    Click,
    /// The first press anchors; pointer movement drags the opposite corner.
    Drag,
}

/// An in-progress crop selection on a display-scaled preview.
#[derive(Debug, Clone)]
pub struct CropSession {
    preview: RgbaImage,
    source: (u32, u32),
    mode: CropMode,
    anchor: Option<(f32, f32)>,
    corner: Option<(f32, f32)>,
}

impl CropSession {
    pub fn new(source: &RgbaImage, preview_max: u32, mode: CropMode) -> Self {
        let (pw, ph) = fit_within(source.dimensions(), preview_max);
        let preview = if (pw, ph) == source.dimensions() {
            source.clone()
        } else {
            image::imageops::resize(source, pw, ph, FilterType::Triangle)
        };
        Self {
            preview,
            source: source.dimensions(),
            mode,
            anchor: None,
            corner: None,
        }
    }

    /// The downscaled raster the user draws on.
    pub fn preview(&self) -> &RgbaImage {
        &self.preview
    }

    pub fn display_dimensions(&self) -> (u32, u32) {
        self.preview.dimensions()
    }

    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source
    }

    pub fn mode(&self) -> CropMode {
        self.mode
    }

    fn clamp_point(&self, point: (f32, f32)) -> (f32, f32) {
        let (w, h) = self.display_dimensions();
        (point.0.clamp(0.0, w as f32), point.1.clamp(0.0, h as f32))
    }

    /// A press at `point` (display coordinates).
    ///
    /// In click mode the first press anchors and the second completes the
    /// rectangle; a third press starts over. In drag mode every press
    /// re-anchors.
    pub fn press(&mut self, point: (f32, f32)) {
        let point = self.clamp_point(point);
        match (self.mode, self.anchor, self.corner) {
            (CropMode::Click, Some(_), None) => self.corner = Some(point),
            _ => {
                self.anchor = Some(point);
                self.corner = None;
            }
        }
    }

    /// Pointer movement. Only tracked in drag mode once anchored.
    pub fn pointer_move(&mut self, point: (f32, f32)) {
        if self.mode == CropMode::Drag && self.anchor.is_some() {
            self.corner = Some(self.clamp_point(point));
        }
    }

    /// Current selection in display coordinates.
    pub fn selection(&self) -> Option<DisplayRect> {
        Some(DisplayRect::from_corners(self.anchor?, self.corner?))
    }

    /// Current selection mapped into source-raster pixels.
    pub fn source_rect(&self) -> Option<CropRect> {
        Some(scale_to_source(
            self.selection()?,
            self.display_dimensions(),
            self.source,
        ))
    }
}
