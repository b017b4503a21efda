//! # caption-band
//!
//! Batch image captioning. Each image is rendered with a black caption band
//! appended underneath: a shared caption on the left, a per-image caption on
//! the right, both wrapped to fit the image width.
//!
//! # Architecture: One Session, One Pump
//!
//! Everything lives in a [`session::CaptionSession`]. Hosts (the CLI, or an
//! interactive front end) push edits into it and call `tick()` to let work
//! happen:
//!
//! ```text
//! edit ──► RenderScheduler ──► TransformStore ──► Compositor ──► encoder
//!          (debounce,          (rotate, crop,     (wrap, draw    (rayon)
//!           coalesce,           raster cache)      band)            │
//!           batch slices)                                           ▼
//!                                                         OutputVersionStore
//! ```
//!
//! Edits are cheap: caption changes are debounced, repeated render requests
//! for the same item collapse into one, and a caption shared by a large batch
//! is applied a slice at a time. Encoding runs on the rayon pool and reports
//! back through a channel, so the session is never blocked by a codec.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | Owner of all items and state; ingest, edits, `tick()`, export |
//! | [`schedule`] | Clocks, cancellable timers, caption debounce, batch slices |
//! | [`transform`] | Rotation state machine with raster cache; crop sessions |
//! | [`layout`] | Greedy word wrapping against a pixel budget |
//! | [`compose`] | Caption band compositing and the asynchronous encode queue |
//! | [`registry`] | Ordered item collection with stable ids |
//! | [`item`] | Per-image state |
//! | [`versions`] | Latest encoded output per item, with source fallback |
//! | [`naming`] | Output filenames derived from captions |
//! | [`compress`] | Downscaling of oversized sources before decode |
//! | [`export`] | Archive sinks: directory and in-memory |
//! | [`imaging`] | Decode/encode/rotate/crop backend and text rendering |
//! | [`config`] | `config.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Rasters Are Shared, Never Copied
//!
//! Every raster an item holds is an `Arc<RgbaImage>`. The rotation cache and
//! the current raster point at the same allocations, so a full rotation
//! cycle costs at most three quarter-turns and returns to the original
//! allocation.
//!
//! ## Deterministic Time
//!
//! The scheduler never reads the wall clock directly. A
//! [`schedule::ManualClock`] makes every debounce and batch decision
//! reproducible in tests.
//!
//! ## Pure-Rust Imaging
//!
//! Codecs come from the `image` crate and text from `ab_glyph`. No system
//! libraries are needed beyond a font file.

pub mod compose;
pub mod compress;
pub mod config;
pub mod export;
pub mod imaging;
pub mod item;
pub mod layout;
pub mod naming;
pub mod output;
pub mod registry;
pub mod schedule;
pub mod session;
pub mod transform;
pub mod versions;

#[cfg(test)]
pub(crate) mod test_helpers;
