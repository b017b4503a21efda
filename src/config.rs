//! Session configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; a user file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [caption]
//! font_size = 96            # Caption text size in pixels (one em)
//! padding = 40              # Band padding around and between columns
//! # font = "/path/to/font.ttf"   # Omit to use the first known system sans-serif
//!
//! [output]
//! format = "jpeg"           # jpeg | png
//! quality = 92              # JPEG quality (1-100)
//!
//! [schedule]
//! caption_debounce_ms = 300 # Quiet time before a caption edit re-renders
//! batch_debounce_ms = 500   # Quiet time before a batch caption is applied
//! batch_size = 10           # Items updated per tick while applying a batch caption
//!
//! [crop]
//! preview_max = 1024        # Longest edge of the crop preview
//!
//! [compression]
//! enabled = true
//! threshold_kb = 2048       # Files at or below this size are left alone
//! max_dimension = 4096      # Longest edge after compression
//! quality = 85              # JPEG quality of the compressed source
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::compose::CaptionStyle;
use crate::compress::CompressionSettings;
use crate::imaging::{EncodeParams, OutputFormat, Quality};
use crate::schedule::ScheduleSettings;
use crate::session::SessionSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptionConfig {
    /// Caption typography.
    pub caption: CaptionSection,
    /// Encoded output format.
    pub output: OutputSection,
    /// Debounce windows and batch slicing.
    pub schedule: ScheduleSection,
    /// Crop preview settings.
    pub crop: CropSection,
    /// Pre-ingest compression.
    pub compression: CompressionSection,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl CaptionConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.caption.font_size == 0 {
            return Err(ConfigError::Validation(
                "caption.font_size must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if !(1..=100).contains(&self.compression.quality) {
            return Err(ConfigError::Validation(
                "compression.quality must be 1-100".into(),
            ));
        }
        if self.schedule.batch_size == 0 {
            return Err(ConfigError::Validation(
                "schedule.batch_size must be non-zero".into(),
            ));
        }
        if self.crop.preview_max == 0 {
            return Err(ConfigError::Validation(
                "crop.preview_max must be non-zero".into(),
            ));
        }
        if self.compression.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "compression.max_dimension must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            style: CaptionStyle {
                font_size: self.caption.font_size,
                padding: self.caption.padding,
            },
            encode: EncodeParams {
                format: self.output.format,
                quality: Quality::new(self.output.quality),
            },
            schedule: ScheduleSettings {
                caption_debounce: Duration::from_millis(self.schedule.caption_debounce_ms),
                batch_debounce: Duration::from_millis(self.schedule.batch_debounce_ms),
                batch_size: self.schedule.batch_size,
            },
            preview_max: self.crop.preview_max,
        }
    }

    /// `None` when compression is disabled.
    pub fn compression_settings(&self) -> Option<CompressionSettings> {
        self.compression.enabled.then(|| CompressionSettings {
            threshold_bytes: self.compression.threshold_kb * 1024,
            max_dimension: self.compression.max_dimension,
            quality: Quality::new(self.compression.quality),
        })
    }
}

/// Caption typography, in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptionSection {
    pub font_size: u32,
    pub padding: u32,
    /// TrueType/OpenType font file. Absent means a system sans-serif.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<PathBuf>,
}

impl Default for CaptionSection {
    fn default() -> Self {
        let style = CaptionStyle::default();
        Self {
            font_size: style.font_size,
            padding: style.padding,
            font: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub format: OutputFormat,
    pub quality: u32,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: Quality::default().value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSection {
    pub caption_debounce_ms: u64,
    pub batch_debounce_ms: u64,
    pub batch_size: usize,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        let settings = ScheduleSettings::default();
        Self {
            caption_debounce_ms: settings.caption_debounce.as_millis() as u64,
            batch_debounce_ms: settings.batch_debounce.as_millis() as u64,
            batch_size: settings.batch_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropSection {
    pub preview_max: u32,
}

impl Default for CropSection {
    fn default() -> Self {
        Self { preview_max: 1024 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionSection {
    pub enabled: bool,
    pub threshold_kb: u64,
    pub max_dimension: u32,
    pub quality: u32,
}

impl Default for CompressionSection {
    fn default() -> Self {
        let settings = CompressionSettings::default();
        Self {
            enabled: true,
            threshold_kb: settings.threshold_bytes / 1024,
            max_dimension: settings.max_dimension,
            quality: settings.quality.value(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel decode/encode workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(CaptionConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CaptionConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CaptionConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or the stock defaults when no path is given.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<CaptionConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# caption-band configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Caption band
# ---------------------------------------------------------------------------
[caption]
# Text size in pixels. One em of the font equals this many pixels, and
# wrapped lines are spaced this far apart.
font_size = 96

# Space above and below the text block, left of the left column, right of
# the right column, and between the two columns.
padding = 40

# Font file used for captions. When omitted, the first of a list of common
# system sans-serif fonts that exists is used.
# font = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[output]
# "jpeg" or "png".
format = "jpeg"

# JPEG quality (1-100). Ignored for PNG.
quality = 92

# ---------------------------------------------------------------------------
# Scheduling
# ---------------------------------------------------------------------------
[schedule]
# A caption edit re-renders once this many milliseconds pass without
# another edit to the same caption.
caption_debounce_ms = 300

# Same for the caption shared by every image's left column.
batch_debounce_ms = 500

# Images updated per tick while a shared caption is being applied.
batch_size = 10

# ---------------------------------------------------------------------------
# Crop
# ---------------------------------------------------------------------------
[crop]
# Longest edge, in pixels, of the preview a crop selection is drawn on.
preview_max = 1024

# ---------------------------------------------------------------------------
# Source compression
# ---------------------------------------------------------------------------
[compression]
# Shrink large source files before decoding.
enabled = true

# Files at or below this size (KiB) are left alone.
threshold_kb = 2048

# Longest edge after compression.
max_dimension = 4096

# JPEG quality of the compressed source (1-100).
quality = 85

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel decode/encode workers. Omit for auto (= number of CPU
# cores). Values larger than the core count are clamped down.
# max_processes = 4
"##
}
