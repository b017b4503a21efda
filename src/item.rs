//! One uploaded image and everything the pipeline tracks about it.

use crate::naming::output_filename;
use crate::registry::ItemId;
use crate::transform::TransformStore;
use crate::versions::{ExportEntry, OutputVersionStore};
use image::RgbaImage;
use std::sync::Arc;

/// An input file as handed over by the host.
///
/// `bytes` is `None` for items created straight from a decoded raster; such
/// items have nothing to export until they are composited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub filename: String,
    pub bytes: Option<Arc<[u8]>>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: Some(bytes.into()),
        }
    }

    /// A source with a name but no retained bytes.
    pub fn named(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            bytes: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.as_ref().map_or(0, |b| b.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct ImageItem {
    pub id: ItemId,
    pub source: SourceFile,
    /// Size of the file before compression, for display.
    pub original_size_bytes: u64,
    pub transform: TransformStore,
    pub left_caption: String,
    pub right_caption: String,
    /// Set between a render request and the start of its composite.
    pub render_queued: bool,
    /// Bumped on every composite; stamped on the encode it produces.
    pub render_generation: u64,
    pub output: OutputVersionStore,
}

impl ImageItem {
    pub fn new(id: ItemId, source: SourceFile, raster: RgbaImage) -> Self {
        Self {
            id,
            original_size_bytes: source.len(),
            source,
            transform: TransformStore::new(raster),
            left_caption: String::new(),
            right_caption: String::new(),
            render_queued: false,
            render_generation: 0,
            output: OutputVersionStore::new(),
        }
    }

    pub fn has_captions(&self) -> bool {
        !self.left_caption.is_empty() || !self.right_caption.is_empty()
    }

    /// Whether a geometric edit must be reflected in a new composite.
    pub fn needs_render_after_transform(&self) -> bool {
        self.has_captions() || self.output.current().is_some()
    }

    pub fn next_generation(&mut self) -> u64 {
        self.render_generation += 1;
        self.render_generation
    }

    pub fn output_filename(&self, extension: &str) -> String {
        output_filename(&self.right_caption, &self.source.filename, extension)
    }

    /// Latest composite, or the source bytes when nothing was composited.
    pub fn output(&self) -> Option<ExportEntry> {
        self.output.output(&self.source)
    }
}
