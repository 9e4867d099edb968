//! Multi-buffered snapshot ring between the update and draw threads.
//!
//! ```text
//! Update → [slot g % N] → publish(latest = g) → read_latest() ← Draw
//! ```
//!
//! Generation `g` lives in slot `g % N`. The writer takes the slot's write
//! lock with a bounded wait; if the draw thread still holds it (it fell more
//! than N-1 generations behind) the write is refused with
//! [`RenderError::Backpressure`] and nothing is touched. `latest` moves only
//! after the whole snapshot is written, so a reader never sees a partial one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use canopy_core::{Counter, Telemetry};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use super::FrameSnapshot;
use crate::error::{RenderError, RenderResult};

/// Read access to a published snapshot. Holding it pins the slot.
pub type SnapshotReadGuard<'a> = RwLockReadGuard<'a, FrameSnapshot>;

/// Ring of `N` frame snapshots with one writer and any number of readers.
pub struct SnapshotRing {
    slots: Box<[RwLock<FrameSnapshot>]>,
    /// Latest fully written generation; zero before the first publish.
    latest: AtomicU64,
    writing: AtomicBool,
    timeout: Duration,
    published: Mutex<()>,
    published_cv: Condvar,
    telemetry: Telemetry,
}

impl SnapshotRing {
    /// Creates a ring of `depth` slots. Depths below 2 are raised to 2.
    #[must_use]
    pub fn new(depth: usize, timeout: Duration, telemetry: Telemetry) -> Self {
        let depth = depth.max(2);
        Self {
            slots: (0..depth).map(|_| RwLock::new(FrameSnapshot::default())).collect(),
            latest: AtomicU64::new(0),
            writing: AtomicBool::new(false),
            timeout,
            published: Mutex::new(()),
            published_cv: Condvar::new(),
            telemetry,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Bounded wait per write attempt.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Latest fully published generation, zero if none.
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    fn slot_of(&self, generation: u64) -> usize {
        (generation % self.slots.len() as u64) as usize
    }

    /// Starts writing the next generation.
    ///
    /// Waits at most [`Self::timeout`] for the slot to be released.
    ///
    /// # Errors
    ///
    /// - [`RenderError::WriterBusy`] if another writer is open
    /// - [`RenderError::Backpressure`] if the slot is still being read
    pub fn begin_write(&self) -> RenderResult<SnapshotWriter<'_>> {
        if self
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RenderError::WriterBusy);
        }

        let generation = self.latest.load(Ordering::Acquire) + 1;
        let slot = self.slot_of(generation);
        let Some(mut guard) = self.slots[slot].try_write_for(self.timeout) else {
            self.writing.store(false, Ordering::Release);
            self.telemetry.incr(Counter::BackpressureStalls);
            warn!(generation, slot, timeout_ms = self.timeout.as_millis() as u64, "snapshot ring full, draw thread behind");
            return Err(RenderError::Backpressure { generation, slot });
        };

        guard.reset(generation, 0.0);
        Ok(SnapshotWriter {
            ring: self,
            guard,
            generation,
            published: false,
        })
    }

    /// The latest published snapshot, or `None` before the first publish.
    ///
    /// If the writer laps the reader between loading `latest` and locking the
    /// slot, the read retries on the newer generation.
    #[must_use]
    pub fn read_latest(&self) -> Option<SnapshotReadGuard<'_>> {
        loop {
            let generation = self.latest.load(Ordering::Acquire);
            if generation == 0 {
                return None;
            }
            let guard = self.slots[self.slot_of(generation)].read();
            if guard.generation == generation {
                return Some(guard);
            }
            debug!(generation, found = guard.generation, "reader lapped, retrying");
        }
    }

    /// Idle-waits until a generation newer than `after` is published.
    ///
    /// Returns the new latest generation, or `None` on timeout.
    #[must_use]
    pub fn wait_for_newer(&self, after: u64, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.published.lock();
        loop {
            let latest = self.latest.load(Ordering::Acquire);
            if latest > after {
                return Some(latest);
            }
            if self.published_cv.wait_until(&mut guard, deadline).timed_out() {
                let latest = self.latest.load(Ordering::Acquire);
                return (latest > after).then_some(latest);
            }
        }
    }

    /// Wakes every idle waiter without publishing, e.g. on shutdown.
    pub fn wake_all(&self) {
        let _guard = self.published.lock();
        self.published_cv.notify_all();
    }

    fn publish(&self, generation: u64) {
        {
            let _guard = self.published.lock();
            self.latest.store(generation, Ordering::Release);
            self.published_cv.notify_all();
        }
        self.writing.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SnapshotRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRing")
            .field("depth", &self.slots.len())
            .field("latest", &self.latest_generation())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the slot of one generation.
///
/// Call [`Self::publish`] once the whole snapshot is written. Dropping the
/// writer without publishing abandons the generation: the slot is marked
/// unpublished and `latest` does not move.
pub struct SnapshotWriter<'a> {
    ring: &'a SnapshotRing,
    guard: RwLockWriteGuard<'a, FrameSnapshot>,
    generation: u64,
    published: bool,
}

impl SnapshotWriter<'_> {
    /// Generation being written.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot to fill. Already reset to this generation.
    pub fn snapshot(&mut self) -> &mut FrameSnapshot {
        &mut self.guard
    }

    /// Makes the generation visible to readers.
    ///
    /// A reader that sees the new `latest` before the slot lock is released
    /// blocks on the slot until it is.
    pub fn publish(mut self) {
        self.published = true;
    }
}

impl Drop for SnapshotWriter<'_> {
    fn drop(&mut self) {
        if self.published {
            self.ring.publish(self.generation);
        } else {
            self.guard.generation = 0;
            self.ring.writing.store(false, Ordering::Release);
            debug!(generation = self.generation, "snapshot write abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::AtomicStats;
    use std::sync::Arc;

    fn ring(depth: usize) -> SnapshotRing {
        SnapshotRing::new(depth, Duration::from_millis(20), Telemetry::disabled())
    }

    fn write(ring: &SnapshotRing, frame_time_ms: f64) -> u64 {
        let mut writer = ring.begin_write().unwrap();
        writer.snapshot().frame_time_ms = frame_time_ms;
        let generation = writer.generation();
        writer.publish();
        generation
    }

    #[test]
    fn test_nothing_before_first_publish() {
        let ring = ring(3);
        assert!(ring.read_latest().is_none());
        assert_eq!(ring.latest_generation(), 0);
    }

    #[test]
    fn test_publish_then_read() {
        let ring = ring(3);
        assert_eq!(write(&ring, 1.0), 1);
        assert_eq!(write(&ring, 2.0), 2);
        let read = ring.read_latest().unwrap();
        assert_eq!(read.generation, 2);
        assert_eq!(read.frame_time_ms, 2.0);
    }

    #[test]
    fn test_depth_is_at_least_two() {
        assert_eq!(ring(0).depth(), 2);
        assert_eq!(ring(5).depth(), 5);
    }

    #[test]
    fn test_unpublished_write_is_invisible() {
        let ring = ring(3);
        write(&ring, 1.0);
        {
            let mut writer = ring.begin_write().unwrap();
            writer.snapshot().frame_time_ms = 99.0;
        }
        assert_eq!(ring.latest_generation(), 1);
        assert_eq!(ring.read_latest().unwrap().frame_time_ms, 1.0);
        // The abandoned generation is retried on the same slot.
        assert_eq!(write(&ring, 2.0), 2);
    }

    #[test]
    fn test_second_writer_is_busy() {
        let ring = ring(3);
        let _writer = ring.begin_write().unwrap();
        assert!(matches!(ring.begin_write(), Err(RenderError::WriterBusy)));
    }

    #[test]
    fn test_backpressure_when_reader_pins_slot() {
        let stats = Arc::new(AtomicStats::new());
        let ring = SnapshotRing::new(2, Duration::from_millis(10), Telemetry::new(stats.clone()));
        write(&ring, 1.0);
        let pinned = ring.read_latest().unwrap();
        assert_eq!(pinned.generation, 1);

        write(&ring, 2.0);
        // Generation 3 maps onto the pinned slot.
        let err = ring.begin_write().err();
        assert_eq!(err, Some(RenderError::Backpressure { generation: 3, slot: 1 }));
        assert_eq!(stats.get(Counter::BackpressureStalls), 1);
        assert_eq!(pinned.generation, 1);

        drop(pinned);
        assert_eq!(write(&ring, 3.0), 3);
    }

    #[test]
    fn test_wait_for_newer_times_out() {
        let ring = ring(3);
        assert_eq!(ring.wait_for_newer(0, Duration::from_millis(5)), None);
        write(&ring, 1.0);
        assert_eq!(ring.wait_for_newer(0, Duration::from_millis(5)), Some(1));
    }

    #[test]
    fn test_wait_for_newer_wakes_on_publish() {
        let ring = Arc::new(ring(3));
        let writer = Arc::clone(&ring);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            write(&writer, 1.0);
        });
        assert_eq!(ring.wait_for_newer(0, Duration::from_secs(5)), Some(1));
        handle.join().unwrap();
    }
}
