//! Debouncing, render coalescing and batch propagation.
//!
//! Nothing here touches pixels. The scheduler decides *when* work happens;
//! [`CaptionSession`](crate::session::CaptionSession) pumps it once per tick
//! and does the work:
//!
//! ```text
//! tick(now)
//!   1. poll(now)            due caption edits and batch values
//!   2. next_batch_slice()   at most `batch_size` items get the batch caption
//!   3. drain_renders()      queued items are composited once each
//! ```
//!
//! Time comes from a [`Clock`] so hosts and tests can drive the scheduler
//! deterministically with a [`ManualClock`].

use crate::item::ImageItem;
use crate::registry::ItemId;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_CAPTION_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_BATCH_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Source of time for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block (or pretend to) until `deadline`.
    fn sleep_until(&self, deadline: Instant);
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// A clock that only moves when told to. Sleeping jumps straight to the
/// deadline.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep_until(&self, deadline: Instant) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if deadline > *now {
            *now = deadline;
        }
    }
}

/// Identifies a scheduled timer for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Cancellable one-shot timers carrying a task value.
#[derive(Debug)]
pub struct Timers<T> {
    entries: Vec<(TimerHandle, Instant, T)>,
    next: u64,
}

impl<T> Default for Timers<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next: 0,
        }
    }
}

impl<T> Timers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration, task: T) -> TimerHandle {
        let handle = TimerHandle(self.next);
        self.next += 1;
        self.entries.push((handle, now + delay, task));
        handle
    }

    /// Returns `false` if the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _, _)| *h != handle);
        self.entries.len() != before
    }

    /// Remove and return every task due at `now`, earliest first. Timers with
    /// equal deadlines fire in scheduling order.
    pub fn take_due(&mut self, now: Instant) -> Vec<(TimerHandle, T)> {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(_, deadline, _)| *deadline <= now);
        self.entries = pending;
        due.sort_by_key(|(handle, deadline, _)| (*deadline, handle.0));
        due.into_iter().map(|(h, _, task)| (h, task)).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(_, deadline, _)| *deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which of an item's two captions an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptionSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub caption_debounce: Duration,
    pub batch_debounce: Duration,
    pub batch_size: usize,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            caption_debounce: DEFAULT_CAPTION_DEBOUNCE,
            batch_debounce: DEFAULT_BATCH_DEBOUNCE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// A debounced edit whose window has closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Due {
    Caption {
        item: ItemId,
        side: CaptionSide,
        text: String,
    },
    Batch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Caption(ItemId, CaptionSide),
    Batch,
}

/// A batch caption being applied across the registry.
#[derive(Debug)]
struct BatchJob {
    value: String,
    remaining: VecDeque<ItemId>,
}

/// One slice of a batch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSlice {
    pub value: String,
    pub items: Vec<ItemId>,
}

#[derive(Debug, Default)]
pub struct RenderScheduler {
    settings: ScheduleSettings,
    timers: Timers<Task>,
    captions: HashMap<(ItemId, CaptionSide), (TimerHandle, String)>,
    batch_pending: Option<(TimerHandle, String)>,
    batch_job: Option<BatchJob>,
    render_queue: VecDeque<ItemId>,
}

impl RenderScheduler {
    pub fn new(settings: ScheduleSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> ScheduleSettings {
        self.settings
    }

    /// Start or restart the debounce window for one caption of one item.
    pub fn edit_caption(&mut self, now: Instant, item: ItemId, side: CaptionSide, text: String) {
        if let Some((handle, _)) = self.captions.remove(&(item, side)) {
            self.timers.cancel(handle);
        }
        let handle = self.timers.schedule_after(
            now,
            self.settings.caption_debounce,
            Task::Caption(item, side),
        );
        tracing::debug!(%item, ?side, "caption edit debounced");
        self.captions.insert((item, side), (handle, text));
    }

    /// Start or restart the debounce window for the batch-wide caption.
    pub fn edit_batch(&mut self, now: Instant, text: String) {
        if let Some((handle, _)) = self.batch_pending.take() {
            self.timers.cancel(handle);
        }
        let handle = self
            .timers
            .schedule_after(now, self.settings.batch_debounce, Task::Batch);
        self.batch_pending = Some((handle, text));
    }

    /// Edits whose debounce window closed at or before `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<Due> {
        let mut fired = Vec::new();
        for (_, task) in self.timers.take_due(now) {
            match task {
                Task::Caption(item, side) => {
                    if let Some((_, text)) = self.captions.remove(&(item, side)) {
                        fired.push(Due::Caption { item, side, text });
                    }
                }
                Task::Batch => {
                    if let Some((_, text)) = self.batch_pending.take() {
                        fired.push(Due::Batch(text));
                    }
                }
            }
        }
        fired
    }

    /// Begin applying `value` to `items` in order, replacing any running job.
    pub fn start_batch(&mut self, value: String, items: Vec<ItemId>) {
        if let Some(old) = &self.batch_job {
            tracing::debug!(
                abandoned = old.remaining.len(),
                "batch caption replaced mid-run"
            );
        }
        self.batch_job = Some(BatchJob {
            value,
            remaining: items.into(),
        });
    }

    /// The next `batch_size` items of the running batch job.
    pub fn next_batch_slice(&mut self) -> Option<BatchSlice> {
        let job = self.batch_job.as_mut()?;
        let take = self.settings.batch_size.max(1).min(job.remaining.len());
        let items: Vec<ItemId> = job.remaining.drain(..take).collect();
        let value = job.value.clone();
        if job.remaining.is_empty() {
            self.batch_job = None;
        }
        if items.is_empty() {
            None
        } else {
            Some(BatchSlice { value, items })
        }
    }

    pub fn batch_running(&self) -> bool {
        self.batch_job.is_some()
    }

    /// Queue a composite for `item`. Returns `false` when one is already
    /// queued; the pending composite will pick up the latest state.
    pub fn request_render(&mut self, item: &mut ImageItem) -> bool {
        if item.render_queued {
            return false;
        }
        item.render_queued = true;
        self.render_queue.push_back(item.id);
        true
    }

    /// Take every queued render in request order.
    pub fn drain_renders(&mut self) -> Vec<ItemId> {
        self.render_queue.drain(..).collect()
    }

    pub fn queued_renders(&self) -> usize {
        self.render_queue.len()
    }

    /// Drop all pending work for a removed item.
    pub fn forget(&mut self, item: ItemId) {
        for side in [CaptionSide::Left, CaptionSide::Right] {
            if let Some((handle, _)) = self.captions.remove(&(item, side)) {
                self.timers.cancel(handle);
            }
        }
        self.render_queue.retain(|id| *id != item);
        if let Some(job) = &mut self.batch_job {
            job.remaining.retain(|id| *id != item);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// No timers, no batch job and no queued renders.
    pub fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.batch_job.is_none() && self.render_queue.is_empty()
    }
}
