//! Latest encoded output per item.
//!
//! Each composite is stamped with the item's render generation. Encodes run
//! concurrently, so completions may arrive out of order; a result is only
//! recorded when its generation is newer than what is already held.

use crate::imaging::{EncodedImage, sniff_mime};
use crate::item::SourceFile;
use std::sync::Arc;

/// A recorded composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputVersion {
    pub generation: u64,
    pub image: EncodedImage,
    pub filename: String,
}

/// What a viewer or archive receives for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub filename: String,
    pub bytes: Arc<[u8]>,
    pub mime: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct OutputVersionStore {
    current: Option<OutputVersion>,
}

impl OutputVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an encode result. Returns `false` (and keeps the held version)
    /// when `generation` is not newer.
    pub fn record(&mut self, generation: u64, image: EncodedImage, filename: String) -> bool {
        if let Some(held) = &self.current
            && held.generation >= generation
        {
            return false;
        }
        self.current = Some(OutputVersion {
            generation,
            image,
            filename,
        });
        true
    }

    pub fn current(&self) -> Option<&OutputVersion> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> Option<u64> {
        self.current.as_ref().map(|v| v.generation)
    }

    /// The latest composite, or the source bytes under their original name
    /// when nothing has been composited yet.
    pub fn output(&self, source: &SourceFile) -> Option<ExportEntry> {
        if let Some(version) = &self.current {
            return Some(ExportEntry {
                filename: version.filename.clone(),
                bytes: Arc::clone(&version.image.bytes),
                mime: version.image.mime,
            });
        }
        let bytes = source.bytes.as_ref()?;
        Some(ExportEntry {
            filename: source.filename.clone(),
            bytes: Arc::clone(bytes),
            mime: sniff_mime(bytes),
        })
    }
}
