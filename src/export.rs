//! Archive collaborators.
//!
//! The session hands every exportable item to an [`ArchiveSink`] in registry
//! order, then finalizes it. Two sinks ship with the crate:
//!
//! ```text
//! DirectorySink   out/
//!                 ├── Hello_World.jpg
//!                 ├── Hello_World-2.jpg     # duplicate name de-duplicated
//!                 ├── captioned-IMG_0042.jpg
//!                 └── manifest.json         # entries in archive order
//!
//! MemorySink      Vec<ExportEntry>
//! ```

use crate::naming::file_stem;
use crate::versions::ExportEntry;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives export entries one at a time and produces an archive.
pub trait ArchiveSink {
    type Output;

    fn add_entry(&mut self, entry: &ExportEntry) -> Result<(), ExportError>;

    fn finalize(self) -> Result<Self::Output, ExportError>;
}

/// One written file, as recorded in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub mime: String,
    pub size: usize,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    entries: &'a [ManifestEntry],
}

/// Result of a finalized [`DirectorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryArchive {
    pub dir: PathBuf,
    pub entries: Vec<ManifestEntry>,
    pub manifest: PathBuf,
}

/// Writes each entry as a file in a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    used: HashSet<String>,
    entries: Vec<ManifestEntry>,
}

impl DirectorySink {
    /// Create `dir` (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            used: HashSet::new(),
            entries: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `name` if unused, else `stem-2.ext`, `stem-3.ext`, ...
fn unique_name(used: &HashSet<String>, name: &str) -> String {
    if !used.contains(name) {
        return name.to_string();
    }
    let stem = file_stem(name);
    let ext = &name[stem.len()..];
    (2..)
        .map(|n| format!("{stem}-{n}{ext}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

impl ArchiveSink for DirectorySink {
    type Output = DirectoryArchive;

    fn add_entry(&mut self, entry: &ExportEntry) -> Result<(), ExportError> {
        let filename = unique_name(&self.used, &entry.filename);
        std::fs::write(self.dir.join(&filename), &entry.bytes)?;
        self.used.insert(filename.clone());
        self.entries.push(ManifestEntry {
            filename,
            mime: entry.mime.to_string(),
            size: entry.bytes.len(),
        });
        Ok(())
    }

    fn finalize(self) -> Result<DirectoryArchive, ExportError> {
        let manifest = self.dir.join("manifest.json");
        let json = serde_json::to_string_pretty(&Manifest {
            entries: &self.entries,
        })?;
        std::fs::write(&manifest, json)?;
        Ok(DirectoryArchive {
            dir: self.dir,
            entries: self.entries,
            manifest,
        })
    }
}

/// Collects entries in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Vec<ExportEntry>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveSink for MemorySink {
    type Output = Vec<ExportEntry>;

    fn add_entry(&mut self, entry: &ExportEntry) -> Result<(), ExportError> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn finalize(self) -> Result<Vec<ExportEntry>, ExportError> {
        Ok(self.entries)
    }
}
