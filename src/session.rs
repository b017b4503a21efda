//! The caption session: one owner for every item and all pipeline state.
//!
//! Hosts talk to the pipeline only through [`CaptionSession`]. Edits are
//! cheap and return immediately; the actual work happens when the host calls
//! [`tick`](CaptionSession::tick), which runs in a fixed order:
//!
//! ```text
//! 1. due timers        debounced caption edits land; a due batch value
//!                      starts a batch job over the current registry order
//! 2. batch slice       the next `batch_size` items get the batch caption
//! 3. composites        every queued item is composited once and sent to
//!                      the encoder
//! 4. encodes           finished encodes are recorded unless the item is
//!                      gone or a newer output is already held
//! ```
//!
//! Batch ingest fans decode and compression out over rayon. Encoding always
//! runs on the rayon pool; the session thread never waits for it except in
//! [`finish_encodes`](CaptionSession::finish_encodes) and export.

use crate::compose::{CaptionStyle, Compositor, EncodeDone, EncodeJob, EncodeQueue};
use crate::compress::Compressor;
use crate::export::{ArchiveSink, ExportError};
use crate::imaging::{BackendError, CropRect, EncodeParams, ImageBackend, TextRenderer};
use crate::item::{ImageItem, SourceFile};
use crate::registry::{ItemId, ItemRegistry};
use crate::schedule::{CaptionSide, Clock, Due, RenderScheduler, ScheduleSettings, SystemClock};
use crate::transform::{CropMode, CropSession, RotateOutcome};
use crate::versions::ExportEntry;
use image::RgbaImage;
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unknown item {0}")]
    UnknownItem(ItemId),
    #[error("no crop in progress")]
    NoCropSession,
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// A source file that could not be decoded. Other files in the same batch
/// are unaffected.
#[derive(Error, Debug)]
#[error("failed to decode {filename}: {source}")]
pub struct ImageDecodeError {
    pub filename: String,
    #[source]
    pub source: BackendError,
}

/// Everything tunable about a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub style: CaptionStyle,
    pub encode: EncodeParams,
    pub schedule: ScheduleSettings,
    /// Longest edge of the crop preview.
    pub preview_max: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            style: CaptionStyle::default(),
            encode: EncodeParams::default(),
            schedule: ScheduleSettings::default(),
            preview_max: 1024,
        }
    }
}

/// One successfully ingested file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedItem {
    pub id: ItemId,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub original_size: u64,
    /// Size after compression; equal to `original_size` when untouched.
    pub stored_size: u64,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub added: Vec<AddedItem>,
    pub failed: Vec<ImageDecodeError>,
}

/// What one [`tick`](CaptionSession::tick) did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub captions_applied: usize,
    pub batches_started: usize,
    pub batch_items: usize,
    pub composited: Vec<ItemId>,
    pub recorded: Vec<ItemId>,
    pub discarded: usize,
    pub failed: Vec<ItemId>,
}

impl TickReport {
    pub fn merge(&mut self, other: TickReport) {
        self.captions_applied += other.captions_applied;
        self.batches_started += other.batches_started;
        self.batch_items += other.batch_items;
        self.composited.extend(other.composited);
        self.recorded.extend(other.recorded);
        self.discarded += other.discarded;
        self.failed.extend(other.failed);
    }

    pub fn is_empty(&self) -> bool {
        *self == TickReport::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedItem {
    pub id: ItemId,
    pub filename: String,
}

/// Result of [`CaptionSession::export`].
#[derive(Debug)]
pub struct ExportReport<T> {
    pub archive: T,
    pub written: Vec<ExportedItem>,
    /// Items with neither a composite nor source bytes, by source filename.
    pub skipped: Vec<ExportedItem>,
}

pub struct CaptionSession {
    backend: Arc<dyn ImageBackend>,
    compositor: Compositor,
    compressor: Option<Arc<dyn Compressor>>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    registry: ItemRegistry,
    scheduler: RenderScheduler,
    encoder: EncodeQueue,
    /// Last batch caption that was applied; new items inherit it.
    batch_caption: String,
    crop: Option<(ItemId, CropSession)>,
}

impl CaptionSession {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        renderer: Arc<dyn TextRenderer>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            compositor: Compositor::new(renderer, settings.style),
            encoder: EncodeQueue::new(Arc::clone(&backend), settings.encode),
            scheduler: RenderScheduler::new(settings.schedule),
            backend,
            compressor: None,
            clock: Arc::new(SystemClock),
            settings,
            registry: ItemRegistry::new(),
            batch_caption: String::new(),
            crop: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    pub fn item(&self, id: ItemId) -> Result<&ImageItem, SessionError> {
        self.registry.get(id).ok_or(SessionError::UnknownItem(id))
    }

    /// The batch caption currently applied to items.
    pub fn batch_caption(&self) -> &str {
        &self.batch_caption
    }

    // =====================================================================
    // Ingest
    // =====================================================================

    /// Compress (optionally) and decode `sources` in parallel, then insert
    /// the successes in input order.
    #[tracing::instrument(skip_all, fields(count = sources.len()))]
    pub fn add_images(&mut self, sources: Vec<SourceFile>) -> IngestReport {
        let backend = &self.backend;
        let compressor = self.compressor.as_deref();

        let decoded: Vec<Result<(SourceFile, u64, RgbaImage), ImageDecodeError>> = sources
            .into_par_iter()
            .map(|source| {
                let original_size = source.len();
                let source = match compressor {
                    Some(c) => c.compress(&source).unwrap_or_else(|e| {
                        tracing::warn!(file = %source.filename, error = %e, "compression failed, keeping original");
                        source.clone()
                    }),
                    None => source,
                };
                let bytes = source.bytes.as_deref().unwrap_or_default();
                match backend.decode(bytes) {
                    Ok(raster) => Ok((source, original_size, raster)),
                    Err(e) => Err(ImageDecodeError {
                        filename: source.filename,
                        source: e,
                    }),
                }
            })
            .collect();

        let mut report = IngestReport::default();
        for result in decoded {
            match result {
                Ok((source, original_size, raster)) => {
                    let stored_size = source.len();
                    let filename = source.filename.clone();
                    let (width, height) = raster.dimensions();
                    let id = self.insert(source, raster);
                    if let Some(item) = self.registry.get_mut(id) {
                        item.original_size_bytes = original_size;
                    }
                    report.added.push(AddedItem {
                        id,
                        filename,
                        width,
                        height,
                        original_size,
                        stored_size,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping image");
                    report.failed.push(e);
                }
            }
        }
        tracing::info!(
            added = report.added.len(),
            failed = report.failed.len(),
            "ingest complete"
        );
        report
    }

    /// Ingest a single file.
    pub fn add_image(&mut self, source: SourceFile) -> Result<ItemId, ImageDecodeError> {
        let mut report = self.add_images(vec![source]);
        match report.failed.pop() {
            Some(e) => Err(e),
            None => Ok(report.added[0].id),
        }
    }

    /// Add an already decoded raster. The item has nothing to export until
    /// it is composited.
    pub fn add_raster(&mut self, filename: impl Into<String>, raster: RgbaImage) -> ItemId {
        self.insert(SourceFile::named(filename), raster)
    }

    fn insert(&mut self, source: SourceFile, raster: RgbaImage) -> ItemId {
        let id = self.registry.allocate_id();
        let mut item = ImageItem::new(id, source, raster);
        item.left_caption = self.batch_caption.clone();
        if item.has_captions() {
            self.scheduler.request_render(&mut item);
        }
        self.registry.insert(item)
    }

    /// Remove an item. An in-flight encode for it completes and is dropped.
    pub fn remove(&mut self, id: ItemId) -> Result<ImageItem, SessionError> {
        let item = self
            .registry
            .remove(id)
            .ok_or(SessionError::UnknownItem(id))?;
        self.scheduler.forget(id);
        if self.crop.as_ref().is_some_and(|(target, _)| *target == id) {
            self.crop = None;
        }
        tracing::debug!(%id, "item removed");
        Ok(item)
    }

    // =====================================================================
    // Edits
    // =====================================================================

    /// Debounced edit of one caption.
    pub fn set_caption(
        &mut self,
        id: ItemId,
        side: CaptionSide,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        if !self.registry.contains(id) {
            return Err(SessionError::UnknownItem(id));
        }
        let now = self.clock.now();
        self.scheduler.edit_caption(now, id, side, text.into());
        Ok(())
    }

    /// Debounced edit of the caption shared by every item's left column.
    pub fn set_batch_caption(&mut self, text: impl Into<String>) {
        let now = self.clock.now();
        self.scheduler.edit_batch(now, text.into());
    }

    /// Rotate an item 90° clockwise.
    pub fn rotate(&mut self, id: ItemId) -> Result<RotateOutcome, SessionError> {
        if self.crop.as_ref().is_some_and(|(target, _)| *target == id) {
            self.crop = None;
        }
        let backend = Arc::clone(&self.backend);
        let item = self
            .registry
            .get_mut(id)
            .ok_or(SessionError::UnknownItem(id))?;
        let outcome = item.transform.rotate(backend.as_ref());
        tracing::debug!(%id, angle = item.transform.angle().degrees(), ?outcome, "rotated");
        if item.needs_render_after_transform() {
            self.scheduler.request_render(item);
        }
        Ok(outcome)
    }

    /// Open a crop session on an item's current raster, replacing any other
    /// crop in progress.
    pub fn begin_crop(&mut self, id: ItemId, mode: CropMode) -> Result<&mut CropSession, SessionError> {
        let preview_max = self.settings.preview_max;
        let session = self.item(id)?.transform.begin_crop(preview_max, mode);
        let (_, session) = self.crop.insert((id, session));
        Ok(session)
    }

    pub fn crop_session_mut(&mut self) -> Option<&mut CropSession> {
        self.crop.as_mut().map(|(_, session)| session)
    }

    pub fn crop_target(&self) -> Option<ItemId> {
        self.crop.as_ref().map(|(id, _)| *id)
    }

    pub fn cancel_crop(&mut self) {
        self.crop = None;
    }

    /// Apply the active crop selection. Returns `false` when there is no
    /// complete selection or it has no area.
    pub fn commit_crop(&mut self) -> Result<bool, SessionError> {
        let (id, session) = self.crop.take().ok_or(SessionError::NoCropSession)?;
        match session.source_rect() {
            Some(rect) => self.apply_crop_rect(id, rect),
            None => Ok(false),
        }
    }

    /// Crop an item's current raster to `rect` (source pixels).
    pub fn apply_crop_rect(&mut self, id: ItemId, rect: CropRect) -> Result<bool, SessionError> {
        let backend = Arc::clone(&self.backend);
        let item = self
            .registry
            .get_mut(id)
            .ok_or(SessionError::UnknownItem(id))?;
        if !item.transform.apply_crop(rect, backend.as_ref()) {
            tracing::debug!(%id, ?rect, "degenerate crop ignored");
            return Ok(false);
        }
        self.scheduler.request_render(item);
        Ok(true)
    }

    // =====================================================================
    // Scheduling pump
    // =====================================================================

    /// Run one scheduling step.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let now = self.clock.now();

        for due in self.scheduler.poll(now) {
            match due {
                Due::Caption { item, side, text } => {
                    let Some(entry) = self.registry.get_mut(item) else {
                        continue;
                    };
                    match side {
                        CaptionSide::Left => entry.left_caption = text,
                        CaptionSide::Right => entry.right_caption = text,
                    }
                    report.captions_applied += 1;
                    self.scheduler.request_render(entry);
                }
                Due::Batch(value) => {
                    tracing::debug!(items = self.registry.len(), "batch caption started");
                    self.batch_caption = value.clone();
                    self.scheduler.start_batch(value, self.registry.ids());
                    report.batches_started += 1;
                }
            }
        }

        if let Some(slice) = self.scheduler.next_batch_slice() {
            for id in slice.items {
                let Some(item) = self.registry.get_mut(id) else {
                    continue;
                };
                item.left_caption.clone_from(&slice.value);
                report.batch_items += 1;
                self.scheduler.request_render(item);
            }
        }

        for id in self.scheduler.drain_renders() {
            if self.render_item(id) {
                report.composited.push(id);
            }
        }

        for done in self.encoder.try_collect() {
            self.accept(done, &mut report);
        }
        report
    }

    /// Composite an item and hand the result to the encoder.
    #[tracing::instrument(skip_all, fields(item = %id))]
    fn render_item(&mut self, id: ItemId) -> bool {
        let Some(item) = self.registry.get_mut(id) else {
            return false;
        };
        item.render_queued = false;
        let generation = item.next_generation();
        let raster = self.compositor.render(
            item.transform.current(),
            &item.left_caption,
            &item.right_caption,
        );
        self.encoder.submit(EncodeJob {
            item: id,
            generation,
            raster,
        });
        true
    }

    fn accept(&mut self, done: EncodeDone, report: &mut TickReport) {
        let extension = self.settings.encode.format.extension();
        let Some(item) = self.registry.get_mut(done.item) else {
            tracing::debug!(item = %done.item, "encode for removed item discarded");
            report.discarded += 1;
            return;
        };
        // An older generation still beats an even older held output; the
        // store refuses anything not newer than what it holds.
        let stale = done.generation < item.render_generation;
        match done.result {
            Ok(image) => {
                let filename = item.output_filename(extension);
                if item.output.record(done.generation, image, filename) {
                    if stale {
                        tracing::debug!(
                            item = %done.item,
                            generation = done.generation,
                            latest = item.render_generation,
                            "older encode recorded until a newer one lands"
                        );
                    }
                    report.recorded.push(done.item);
                } else {
                    tracing::debug!(
                        item = %done.item,
                        generation = done.generation,
                        "stale encode discarded"
                    );
                    report.discarded += 1;
                }
            }
            Err(e) if stale => {
                tracing::debug!(item = %done.item, error = %e, "stale encode failed");
                report.discarded += 1;
            }
            Err(e) => {
                tracing::warn!(item = %done.item, error = %e, "encode failed, keeping previous output");
                report.failed.push(done.item);
            }
        }
    }

    /// Block until every in-flight encode has been recorded or discarded.
    pub fn finish_encodes(&mut self) -> TickReport {
        let mut report = TickReport::default();
        while let Some(done) = self.encoder.wait() {
            self.accept(done, &mut report);
        }
        report
    }

    /// Nothing scheduled and nothing encoding.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle() && self.encoder.in_flight() == 0
    }

    /// Tick until idle, sleeping on the clock through debounce windows.
    pub fn run_until_idle(&mut self) -> TickReport {
        let mut total = TickReport::default();
        loop {
            total.merge(self.tick());
            if !self.scheduler.is_idle() {
                if !self.scheduler.batch_running()
                    && let Some(deadline) = self.scheduler.next_deadline()
                {
                    self.clock.sleep_until(deadline);
                }
                continue;
            }
            if self.encoder.in_flight() == 0 {
                return total;
            }
            total.merge(self.finish_encodes());
        }
    }

    // =====================================================================
    // Output
    // =====================================================================

    /// What a viewer shows for an item right now.
    pub fn output(&self, id: ItemId) -> Result<Option<ExportEntry>, SessionError> {
        Ok(self.item(id)?.output())
    }

    /// Wait for in-flight encodes, then write every item's output to `sink`
    /// in registry order.
    pub fn export<S: ArchiveSink>(&mut self, mut sink: S) -> Result<ExportReport<S::Output>, SessionError> {
        self.finish_encodes();

        let mut written = Vec::new();
        let mut skipped = Vec::new();
        for item in self.registry.iter() {
            match item.output() {
                Some(entry) => {
                    sink.add_entry(&entry)?;
                    written.push(ExportedItem {
                        id: item.id,
                        filename: entry.filename,
                    });
                }
                None => {
                    tracing::warn!(item = %item.id, file = %item.source.filename, "nothing to export");
                    skipped.push(ExportedItem {
                        id: item.id,
                        filename: item.source.filename.clone(),
                    });
                }
            }
        }

        let archive = sink.finalize()?;
        tracing::info!(written = written.len(), skipped = skipped.len(), "export complete");
        Ok(ExportReport {
            archive,
            written,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{CompressError, CompressionSettings, DownscaleCompressor};
    use crate::export::MemorySink;
    use crate::imaging::backend::tests::RecordedOp;
    use crate::imaging::text::tests::FixedAdvance;
    use crate::imaging::{EncodedImage, Quality, RustBackend};
    use crate::schedule::ManualClock;
    use crate::test_helpers::{encode_test_png, mock_session, noise, solid};
    use crate::transform::Rotation;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn mock_file(name: &str, dims: &str) -> SourceFile {
        SourceFile::new(name, dims.as_bytes().to_vec())
    }

    #[test]
    fn add_images_keeps_input_order_and_reports_failures() {
        let (mut session, _, _) = mock_session();
        let report = session.add_images(vec![
            mock_file("a.jpg", "10x10"),
            mock_file("bad.jpg", "not an image"),
            mock_file("c.jpg", "5x4"),
        ]);

        let names: Vec<&str> = report.added.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "c.jpg"]);
        assert_eq!((report.added[1].width, report.added[1].height), (5, 4));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].filename, "bad.jpg");
        assert_eq!(session.registry().len(), 2);
    }

    #[test]
    fn add_image_single() {
        let (mut session, _, _) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "8x6")).unwrap();
        assert_eq!(session.item(id).unwrap().transform.current().dimensions(), (8, 6));
        assert!(session.add_image(mock_file("b.jpg", "x")).is_err());
    }

    #[test]
    fn right_caption_scenario() {
        let (mut session, backend, clock) = mock_session();
        let id = session.add_image(mock_file("IMG_1.jpg", "800x600")).unwrap();
        session.set_caption(id, CaptionSide::Right, "Cat").unwrap();

        clock.advance(ms(299));
        assert!(session.tick().composited.is_empty());

        clock.advance(ms(1));
        let report = session.tick();
        assert_eq!(report.captions_applied, 1);
        assert_eq!(report.composited, vec![id]);

        session.finish_encodes();
        let out = session.output(id).unwrap().unwrap();
        assert_eq!(out.filename, "Cat.jpg");
        assert_eq!(&*out.bytes, b"jpg:800x776");
        assert_eq!(backend.encodes(), 1);
    }

    #[test]
    fn rapid_edits_render_once_with_last_value() {
        let (mut session, backend, clock) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "100x100")).unwrap();
        for text in ["S", "Su", "Sun", "Sunset"] {
            session.set_caption(id, CaptionSide::Right, text).unwrap();
            clock.advance(ms(100));
            session.tick();
        }
        session.run_until_idle();

        assert_eq!(backend.encodes(), 1);
        assert_eq!(session.item(id).unwrap().right_caption, "Sunset");
        assert_eq!(session.output(id).unwrap().unwrap().filename, "Sunset.jpg");
    }

    #[test]
    fn rotation_without_captions_does_not_render() {
        let (mut session, backend, _) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "800x600")).unwrap();
        session.rotate(id).unwrap();
        session.run_until_idle();
        assert_eq!(backend.encodes(), 0);
        // export falls back to source bytes
        assert_eq!(session.output(id).unwrap().unwrap().filename, "a.jpg");
    }

    #[test]
    fn rotations_coalesce_into_one_render() {
        let (mut session, backend, clock) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "800x600")).unwrap();
        session.set_caption(id, CaptionSide::Left, "Trip").unwrap();
        clock.advance(ms(300));
        session.tick();
        session.finish_encodes();
        assert_eq!(backend.encodes(), 1);

        session.rotate(id).unwrap();
        session.rotate(id).unwrap();
        assert!(session.item(id).unwrap().render_queued);
        let report = session.tick();
        assert_eq!(report.composited, vec![id]);
        session.finish_encodes();

        let item = session.item(id).unwrap();
        assert_eq!(item.transform.angle(), Rotation::Deg180);
        assert!(!item.render_queued);
        assert_eq!(backend.encodes(), 2);
        assert_eq!(&*session.output(id).unwrap().unwrap().bytes, b"jpg:800x776");
    }

    #[test]
    fn rotate_after_output_rerenders_even_without_captions() {
        let (mut session, backend, _) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "80x60")).unwrap();
        session.apply_crop_rect(id, CropRect::new(0, 0, 40, 60)).unwrap();
        session.run_until_idle();
        assert_eq!(backend.encodes(), 1);

        session.rotate(id).unwrap();
        session.run_until_idle();
        assert_eq!(backend.encodes(), 2);
        // 60 wide after rotation, band 176 under 40
        assert_eq!(&*session.output(id).unwrap().unwrap().bytes, b"jpg:60x216");
    }

    #[test]
    fn batch_caption_applies_in_slices() {
        let (mut session, _, clock) = mock_session();
        let files: Vec<SourceFile> = (0..25).map(|i| mock_file(&format!("{i}.jpg"), "4x4")).collect();
        session.add_images(files);

        session.set_batch_caption("Summer");
        clock.advance(ms(500));

        let sizes: Vec<usize> = (0..4).map(|_| session.tick().batch_items).collect();
        assert_eq!(sizes, vec![10, 10, 5, 0]);
        assert!(session.registry().iter().all(|i| i.left_caption == "Summer"));
        assert_eq!(session.batch_caption(), "Summer");
    }

    #[test]
    fn batch_slice_composites_in_the_same_tick() {
        let (mut session, _, clock) = mock_session();
        let files: Vec<SourceFile> = (0..3).map(|i| mock_file(&format!("{i}.jpg"), "4x4")).collect();
        session.add_images(files);
        session.set_batch_caption("x");
        clock.advance(ms(500));
        assert_eq!(session.tick().composited.len(), 3);
    }

    #[test]
    fn new_items_inherit_applied_batch_caption() {
        let (mut session, _, clock) = mock_session();
        session.add_image(mock_file("a.jpg", "4x4")).unwrap();
        session.set_batch_caption("Trip");
        session.run_until_idle();

        let id = session.add_image(mock_file("b.jpg", "4x4")).unwrap();
        let item = session.item(id).unwrap();
        assert_eq!(item.left_caption, "Trip");
        assert!(item.render_queued);

        // a pending, not yet applied value is not inherited
        session.set_batch_caption("Other");
        clock.advance(ms(100));
        let id = session.add_image(mock_file("c.jpg", "4x4")).unwrap();
        assert_eq!(session.item(id).unwrap().left_caption, "Trip");
    }

    #[test]
    fn removed_item_encode_is_discarded() {
        let (mut session, _, _) = mock_session();
        let id = session.add_raster("a.png", solid(2, 2, [0; 4]));
        session.remove(id).unwrap();

        let mut report = TickReport::default();
        session.accept(
            EncodeDone {
                item: id,
                generation: 1,
                result: Ok(EncodedImage {
                    bytes: Arc::from(b"x".to_vec()),
                    mime: "image/jpeg",
                    width: 2,
                    height: 2,
                }),
            },
            &mut report,
        );
        assert_eq!(report.discarded, 1);
        assert!(report.recorded.is_empty());
    }

    fn done(item: ItemId, generation: u64, tag: &str) -> EncodeDone {
        EncodeDone {
            item,
            generation,
            result: Ok(EncodedImage {
                bytes: Arc::from(tag.as_bytes().to_vec()),
                mime: "image/jpeg",
                width: 2,
                height: 2,
            }),
        }
    }

    #[test]
    fn older_encode_never_replaces_newer_output() {
        let (mut session, _, _) = mock_session();
        let id = session.add_raster("a.png", solid(2, 2, [0; 4]));
        session.registry.get_mut(id).unwrap().render_generation = 2;

        let mut report = TickReport::default();
        session.accept(done(id, 2, "new"), &mut report);
        session.accept(done(id, 1, "old"), &mut report);
        assert_eq!(report.recorded, vec![id]);
        assert_eq!(report.discarded, 1);
        assert_eq!(&*session.output(id).unwrap().unwrap().bytes, b"new");
    }

    #[test]
    fn older_encode_fills_in_when_newest_fails() {
        let (mut session, _, _) = mock_session();
        let id = session.add_raster("a.png", solid(2, 2, [0; 4]));
        session.registry.get_mut(id).unwrap().render_generation = 3;

        let mut report = TickReport::default();
        session.accept(
            EncodeDone {
                item: id,
                generation: 3,
                result: Err(BackendError::EncodeFailed("disk full".into())),
            },
            &mut report,
        );
        session.accept(done(id, 2, "two"), &mut report);
        session.accept(done(id, 1, "one"), &mut report);

        assert_eq!(report.failed, vec![id]);
        assert_eq!(report.recorded, vec![id]);
        assert_eq!(report.discarded, 1);
        let output = session.output(id).unwrap().unwrap();
        assert_eq!(&*output.bytes, b"two");
        assert_eq!(session.item(id).unwrap().output.generation(), Some(2));
    }

    #[test]
    fn failed_stale_encode_is_not_reported_as_failure() {
        let (mut session, _, _) = mock_session();
        let id = session.add_raster("a.png", solid(2, 2, [0; 4]));
        session.registry.get_mut(id).unwrap().render_generation = 2;

        let mut report = TickReport::default();
        session.accept(
            EncodeDone {
                item: id,
                generation: 1,
                result: Err(BackendError::EncodeFailed("disk full".into())),
            },
            &mut report,
        );
        assert!(report.failed.is_empty());
        assert_eq!(report.discarded, 1);
    }

    #[test]
    fn encode_failure_keeps_previous_output() {
        let (mut session, _, clock) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "10x10")).unwrap();
        session.set_caption(id, CaptionSide::Right, "Keep").unwrap();
        clock.advance(ms(300));
        session.run_until_idle();
        let before = session.output(id).unwrap().unwrap();

        let generation = session.registry.get_mut(id).unwrap().next_generation();
        let mut report = TickReport::default();
        session.accept(
            EncodeDone {
                item: id,
                generation,
                result: Err(BackendError::EncodeFailed("disk full".into())),
            },
            &mut report,
        );
        assert_eq!(report.failed, vec![id]);
        assert_eq!(session.output(id).unwrap().unwrap(), before);
    }

    #[test]
    fn crop_session_commit() {
        let (mut session, backend, _) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "200x100")).unwrap();

        let crop = session.begin_crop(id, CropMode::Click).unwrap();
        assert_eq!(crop.display_dimensions(), (100, 50));
        crop.press((10.0, 5.0));
        crop.press((60.0, 45.0));
        assert_eq!(session.crop_target(), Some(id));

        assert!(session.commit_crop().unwrap());
        assert!(session.crop_target().is_none());
        let item = session.item(id).unwrap();
        assert_eq!(item.transform.current().dimensions(), (100, 80));
        assert!(backend.get_operations().contains(&RecordedOp::Crop(CropRect::new(20, 10, 100, 80))));

        session.run_until_idle();
        assert_eq!(backend.encodes(), 1);
    }

    #[test]
    fn incomplete_or_degenerate_crop_is_noop() {
        let (mut session, backend, _) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "100x100")).unwrap();

        session.begin_crop(id, CropMode::Click).unwrap().press((10.0, 10.0));
        assert!(!session.commit_crop().unwrap());

        let crop = session.begin_crop(id, CropMode::Click).unwrap();
        crop.press((10.0, 10.0));
        crop.press((10.0, 80.0));
        assert!(!session.commit_crop().unwrap());

        assert!(matches!(session.commit_crop(), Err(SessionError::NoCropSession)));
        session.run_until_idle();
        assert_eq!(backend.encodes(), 0);
        assert_eq!(session.item(id).unwrap().transform.current().dimensions(), (100, 100));
    }

    #[test]
    fn only_one_crop_session() {
        let (mut session, _, _) = mock_session();
        let a = session.add_image(mock_file("a.jpg", "10x10")).unwrap();
        let b = session.add_image(mock_file("b.jpg", "10x10")).unwrap();
        session.begin_crop(a, CropMode::Drag).unwrap();
        session.begin_crop(b, CropMode::Drag).unwrap();
        assert_eq!(session.crop_target(), Some(b));
        session.remove(b).unwrap();
        assert!(session.crop_session_mut().is_none());
    }

    #[test]
    fn unknown_ids_are_errors() {
        let (mut session, _, _) = mock_session();
        let ghost = ItemId(99);
        assert!(matches!(session.rotate(ghost), Err(SessionError::UnknownItem(_))));
        assert!(matches!(
            session.set_caption(ghost, CaptionSide::Left, "x"),
            Err(SessionError::UnknownItem(_))
        ));
        assert!(matches!(session.remove(ghost), Err(SessionError::UnknownItem(_))));
        assert!(matches!(session.output(ghost), Err(SessionError::UnknownItem(_))));
        assert!(session.begin_crop(ghost, CropMode::Click).is_err());
    }

    #[test]
    fn caption_edit_for_removed_item_is_dropped() {
        let (mut session, backend, clock) = mock_session();
        let id = session.add_image(mock_file("a.jpg", "10x10")).unwrap();
        session.set_caption(id, CaptionSide::Right, "gone").unwrap();
        session.remove(id).unwrap();
        clock.advance(ms(300));
        assert!(session.run_until_idle().is_empty());
        assert_eq!(backend.encodes(), 0);
    }

    #[test]
    fn export_in_registry_order_and_skips_unexportable() {
        let (mut session, _, clock) = mock_session();
        let a = session.add_image(mock_file("a.jpg", "10x10")).unwrap();
        let raw = session.add_raster("raw.png", solid(3, 3, [0; 4]));
        let c = session.add_image(mock_file("c.jpg", "10x10")).unwrap();
        session.set_caption(c, CaptionSide::Right, "Hello, World!").unwrap();
        clock.advance(ms(300));
        session.tick();

        let report = session.export(MemorySink::new()).unwrap();
        let names: Vec<&str> = report.archive.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "Hello_World.jpg"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, raw);
        assert_eq!(report.skipped[0].filename, "raw.png");
        assert_eq!(report.written[0].id, a);
    }

    struct FailingCompressor;

    impl Compressor for FailingCompressor {
        fn compress(&self, source: &SourceFile) -> Result<SourceFile, CompressError> {
            Err(CompressError::NoBytes(source.filename.clone()))
        }
    }

    /// Divides both mock dimensions by ten.
    struct TenthCompressor;

    impl Compressor for TenthCompressor {
        fn compress(&self, source: &SourceFile) -> Result<SourceFile, CompressError> {
            let text = std::str::from_utf8(source.bytes.as_deref().unwrap()).unwrap();
            let (w, h) = text.split_once('x').unwrap();
            let smaller = format!("{}x{}", &w[..w.len() - 1], &h[..h.len() - 1]);
            Ok(SourceFile::new(source.filename.clone(), smaller.into_bytes()))
        }
    }

    #[test]
    fn compression_failure_keeps_original_bytes() {
        let (session, _, _) = mock_session();
        let mut session = session.with_compressor(Arc::new(FailingCompressor));
        let report = session.add_images(vec![mock_file("a.jpg", "800x600")]);

        assert!(report.failed.is_empty());
        let added = &report.added[0];
        assert_eq!(added.original_size, 7);
        assert_eq!(added.stored_size, added.original_size);
        let item = session.item(added.id).unwrap();
        assert_eq!(item.source.bytes.as_deref(), Some(&b"800x600"[..]));
        assert_eq!(item.original_size_bytes, 7);
        assert_eq!(item.transform.current().dimensions(), (800, 600));
    }

    #[test]
    fn compressed_source_is_stored_and_sizes_reported() {
        let (session, _, _) = mock_session();
        let mut session = session.with_compressor(Arc::new(TenthCompressor));
        let report = session.add_images(vec![mock_file("a.jpg", "800x600")]);

        let added = &report.added[0];
        assert_eq!(added.original_size, 7);
        assert_eq!(added.stored_size, 5);
        assert!(added.stored_size < added.original_size);
        let item = session.item(added.id).unwrap();
        assert_eq!(item.source.bytes.as_deref(), Some(&b"80x60"[..]));
        assert_eq!(item.original_size_bytes, 7);
        assert_eq!((added.width, added.height), (80, 60));
    }

    #[test]
    fn compressed_png_exports_as_jpg() {
        let backend = Arc::new(RustBackend::new());
        let compressor = DownscaleCompressor::new(
            backend.clone(),
            CompressionSettings {
                threshold_bytes: 1024,
                max_dimension: 100,
                quality: Quality::new(80),
            },
        );
        let mut session =
            CaptionSession::new(backend, Arc::new(FixedAdvance), SessionSettings::default())
                .with_clock(Arc::new(ManualClock::new()))
                .with_compressor(Arc::new(compressor));
        let opaque = encode_test_png(&noise(300, 200, 255));
        let translucent = encode_test_png(&noise(300, 200, 100));
        session.add_images(vec![
            SourceFile::new("photo.png", opaque),
            SourceFile::new("logo.png", translucent.clone()),
        ]);

        let entries = session.export(MemorySink::new()).unwrap().archive;
        assert_eq!(entries[0].filename, "photo.jpg");
        assert_eq!(entries[0].mime, "image/jpeg");
        assert_eq!(entries[1].filename, "logo.png");
        assert_eq!(entries[1].mime, "image/png");
        assert_eq!(&*entries[1].bytes, translucent.as_slice());
    }

    #[test]
    fn run_until_idle_on_empty_session() {
        let (mut session, _, _) = mock_session();
        assert!(session.run_until_idle().is_empty());
        assert!(session.is_idle());
    }
}
