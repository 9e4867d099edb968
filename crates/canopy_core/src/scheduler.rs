//! Deferred actions for the update thread.
//!
//! Drained at one fixed point of each tick, before the snapshot walk:
//!
//! 1. tasks submitted from other threads move into the queue
//! 2. timed tasks that are due join the queue, repeating ones re-arm
//! 3. per-tick tasks join the queue
//! 4. the queue runs in FIFO order
//!
//! Tasks submitted while the queue runs wait for the next tick.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::telemetry::{Counter, Telemetry};

type Task<C> = Box<dyn FnMut(&mut C) + Send>;

/// Cancellation and pause switch for a scheduled task.
#[derive(Debug, Clone, Default)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl ScheduledHandle {
    /// Stops the task from running again.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Skips runs until [`Self::resume`]. Repeating tasks keep their
    /// schedule; one-shot tasks are held and run on the first update after
    /// resuming.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Undoes [`Self::pause`].
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

struct Entry<C> {
    task: Task<C>,
    handle: ScheduledHandle,
}

struct TimedEntry<C> {
    due_ms: f64,
    repeat_ms: Option<f64>,
    seq: u64,
    entry: Entry<C>,
}

enum Submission<C> {
    Once(Entry<C>),
    Delayed { delay_ms: f64, repeat: bool, entry: Entry<C> },
}

/// Submits tasks to a [`Scheduler`] from any thread.
pub struct SchedulerSender<C> {
    tx: Sender<Submission<C>>,
}

impl<C> Clone for SchedulerSender<C> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<C> SchedulerSender<C> {
    /// Runs `task` on the next tick. Returns `None` once the scheduler is gone.
    pub fn add(&self, task: impl FnMut(&mut C) + Send + 'static) -> Option<ScheduledHandle> {
        let handle = ScheduledHandle::default();
        let entry = Entry {
            task: Box::new(task),
            handle: handle.clone(),
        };
        self.tx.send(Submission::Once(entry)).ok().map(|()| handle)
    }

    /// Runs `task` once `delay_ms` has passed, measured from the tick that
    /// receives it; with `repeat`, every `delay_ms` after that.
    pub fn add_delayed(
        &self,
        delay_ms: f64,
        repeat: bool,
        task: impl FnMut(&mut C) + Send + 'static,
    ) -> Option<ScheduledHandle> {
        let handle = ScheduledHandle::default();
        let entry = Entry {
            task: Box::new(task),
            handle: handle.clone(),
        };
        self.tx
            .send(Submission::Delayed {
                delay_ms,
                repeat,
                entry,
            })
            .ok()
            .map(|()| handle)
    }
}

/// Per-tick task queue owned by the update thread.
///
/// `C` is the context tasks run against, normally the scene tree.
pub struct Scheduler<C> {
    queue: VecDeque<Entry<C>>,
    timed: Vec<TimedEntry<C>>,
    per_tick: Vec<Entry<C>>,
    rx: Receiver<Submission<C>>,
    tx: Sender<Submission<C>>,
    timed_limit: usize,
    next_seq: u64,
    now_ms: f64,
    telemetry: Telemetry,
}

impl<C> Scheduler<C> {
    /// An empty scheduler. Above `timed_limit` timed tasks, repeating tasks
    /// re-arm from the current time instead of catching up.
    #[must_use]
    pub fn new(timed_limit: usize, telemetry: Telemetry) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            queue: VecDeque::new(),
            timed: Vec::new(),
            per_tick: Vec::new(),
            rx,
            tx,
            timed_limit,
            next_seq: 0,
            now_ms: 0.0,
            telemetry,
        }
    }

    /// A cross-thread submission handle.
    #[must_use]
    pub fn sender(&self) -> SchedulerSender<C> {
        SchedulerSender {
            tx: self.tx.clone(),
        }
    }

    /// Runs `task` on the next [`Self::update`].
    pub fn add(&mut self, task: impl FnMut(&mut C) + Send + 'static) -> ScheduledHandle {
        let handle = ScheduledHandle::default();
        self.queue.push_back(Entry {
            task: Box::new(task),
            handle: handle.clone(),
        });
        handle
    }

    /// Runs `task` once `delay_ms` after the last update time; with
    /// `repeat`, every `delay_ms` after that.
    pub fn add_delayed(
        &mut self,
        delay_ms: f64,
        repeat: bool,
        task: impl FnMut(&mut C) + Send + 'static,
    ) -> ScheduledHandle {
        let handle = ScheduledHandle::default();
        self.insert_timed(
            delay_ms,
            repeat,
            Entry {
                task: Box::new(task),
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Runs `task` on every update until cancelled.
    pub fn add_per_tick(&mut self, task: impl FnMut(&mut C) + Send + 'static) -> ScheduledHandle {
        let handle = ScheduledHandle::default();
        self.per_tick.push(Entry {
            task: Box::new(task),
            handle: handle.clone(),
        });
        handle
    }

    /// Timed tasks waiting.
    #[must_use]
    pub fn timed_len(&self) -> usize {
        self.timed.len()
    }

    fn insert_timed(&mut self, delay_ms: f64, repeat: bool, entry: Entry<C>) {
        let delay_ms = delay_ms.max(0.0);
        let timed = TimedEntry {
            due_ms: self.now_ms + delay_ms,
            repeat_ms: (repeat && delay_ms > 0.0).then_some(delay_ms),
            seq: self.next_seq,
            entry,
        };
        self.next_seq += 1;
        self.push_sorted(timed);
    }

    /// Keeps `timed` ordered by due time, ties in insertion order.
    fn push_sorted(&mut self, timed: TimedEntry<C>) {
        let at = self
            .timed
            .partition_point(|t| (t.due_ms, t.seq) <= (timed.due_ms, timed.seq));
        self.timed.insert(at, timed);
    }

    /// Runs everything due at `now_ms` against `ctx`. Returns the number
    /// of tasks run.
    pub fn update(&mut self, ctx: &mut C, now_ms: f64) -> usize {
        self.now_ms = now_ms;
        while let Ok(submission) = self.rx.try_recv() {
            match submission {
                Submission::Once(entry) => self.queue.push_back(entry),
                Submission::Delayed {
                    delay_ms,
                    repeat,
                    entry,
                } => self.insert_timed(delay_ms, repeat, entry),
            }
        }

        let mut run = 0;
        let mut held = VecDeque::new();
        for mut entry in std::mem::take(&mut self.queue) {
            if is_held(&entry) {
                held.push_back(entry);
                continue;
            }
            run += run_entry(&mut entry, ctx);
        }
        self.queue = held;

        let due = self.timed.partition_point(|t| t.due_ms <= now_ms);
        let fired: Vec<TimedEntry<C>> = self.timed.drain(..due).collect();
        for mut timed in fired {
            if timed.entry.handle.is_cancelled() {
                continue;
            }
            if timed.repeat_ms.is_none() && is_held(&timed.entry) {
                self.push_sorted(timed);
                continue;
            }
            run += run_entry(&mut timed.entry, ctx);
            let Some(interval) = timed.repeat_ms else {
                continue;
            };
            if self.timed.len() < self.timed_limit {
                timed.due_ms += interval;
            } else {
                tracing::warn!(
                    pending = self.timed.len(),
                    "timed tasks overflowing, re-arming from now"
                );
                timed.due_ms = now_ms + interval;
            }
            timed.seq = self.next_seq;
            self.next_seq += 1;
            self.push_sorted(timed);
        }

        self.per_tick.retain(|entry| !entry.handle.is_cancelled());
        for entry in &mut self.per_tick {
            run += run_entry(entry, ctx);
        }

        self.telemetry.add(Counter::ScheduledTasksRun, run as u64);
        run
    }
}

fn is_held<C>(entry: &Entry<C>) -> bool {
    entry.handle.is_paused() && !entry.handle.is_cancelled()
}

fn run_entry<C>(entry: &mut Entry<C>, ctx: &mut C) -> usize {
    if entry.handle.is_cancelled() || entry.handle.is_paused() {
        return 0;
    }
    (entry.task)(ctx);
    1
}

impl<C> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queue.len())
            .field("timed", &self.timed.len())
            .field("per_tick", &self.per_tick.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> Scheduler<Vec<&'static str>> {
        Scheduler::new(1000, Telemetry::disabled())
    }

    #[test]
    fn test_queue_runs_fifo_once() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        scheduler.add(|log| log.push("a"));
        scheduler.add(|log| log.push("b"));
        scheduler.add(|log| log.push("c"));

        assert_eq!(scheduler.update(&mut log, 0.0), 3);
        assert_eq!(log, vec!["a", "b", "c"]);
        assert_eq!(scheduler.update(&mut log, 1.0), 0);
    }

    #[test]
    fn test_delayed_waits_for_due_time() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        scheduler.add_delayed(10.0, false, |log| log.push("late"));

        scheduler.update(&mut log, 5.0);
        assert!(log.is_empty());
        scheduler.update(&mut log, 10.0);
        assert_eq!(log, vec!["late"]);
        scheduler.update(&mut log, 30.0);
        assert_eq!(log.len(), 1);
        assert_eq!(scheduler.timed_len(), 0);
    }

    #[test]
    fn test_repeating_task_rearms() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        let handle = scheduler.add_delayed(10.0, true, |log| log.push("tick"));

        for now in [10.0, 15.0, 20.0, 30.0] {
            scheduler.update(&mut log, now);
        }
        assert_eq!(log.len(), 3);

        handle.cancel();
        scheduler.update(&mut log, 40.0);
        assert_eq!(log.len(), 3);
        assert_eq!(scheduler.timed_len(), 0);
    }

    #[test]
    fn test_overflow_rearms_from_now() {
        let mut scheduler: Scheduler<u32> = Scheduler::new(1, Telemetry::disabled());
        let mut count = 0;
        scheduler.add_delayed(10.0, true, |c| *c += 1);
        scheduler.add_delayed(10.0, true, |c| *c += 1);

        // Far behind. The first task re-arms while the list is under the
        // limit and catches up one step per tick; the second is re-armed
        // from now.
        scheduler.update(&mut count, 1000.0);
        assert_eq!(count, 2);
        scheduler.update(&mut count, 1001.0);
        assert_eq!(count, 3);
        // Once the list is full the first task is re-armed from now as well.
        scheduler.update(&mut count, 1005.0);
        assert_eq!(count, 3);
        scheduler.update(&mut count, 1010.0);
        assert_eq!(count, 4);
        scheduler.update(&mut count, 1011.0);
        assert_eq!(count, 5);
    }

    #[test]
    fn test_timed_ties_keep_insertion_order() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        scheduler.add_delayed(5.0, false, |log| log.push("first"));
        scheduler.add_delayed(5.0, false, |log| log.push("second"));
        scheduler.add_delayed(1.0, false, |log| log.push("earliest"));
        scheduler.update(&mut log, 5.0);
        assert_eq!(log, vec!["earliest", "first", "second"]);
    }

    #[test]
    fn test_per_tick_and_pause() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        let handle = scheduler.add_per_tick(|log| log.push("frame"));

        scheduler.update(&mut log, 0.0);
        handle.pause();
        scheduler.update(&mut log, 1.0);
        handle.resume();
        scheduler.update(&mut log, 2.0);
        handle.cancel();
        scheduler.update(&mut log, 3.0);
        assert_eq!(log, vec!["frame", "frame"]);
    }

    #[test]
    fn test_paused_one_shot_runs_after_resume() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        let queued = scheduler.add(|log| log.push("queued"));
        let timed = scheduler.add_delayed(5.0, false, |log| log.push("timed"));
        queued.pause();
        timed.pause();

        assert_eq!(scheduler.update(&mut log, 10.0), 0);
        assert!(log.is_empty());
        assert_eq!(scheduler.timed_len(), 1);

        queued.resume();
        timed.resume();
        assert_eq!(scheduler.update(&mut log, 11.0), 2);
        assert_eq!(log, vec!["queued", "timed"]);
        assert_eq!(scheduler.update(&mut log, 12.0), 0);
        assert_eq!(scheduler.timed_len(), 0);
    }

    #[test]
    fn test_paused_then_cancelled_is_dropped() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        let handle = scheduler.add(|log| log.push("never"));
        handle.pause();
        scheduler.update(&mut log, 0.0);
        handle.cancel();
        handle.resume();
        assert_eq!(scheduler.update(&mut log, 1.0), 0);
        assert!(log.is_empty());
        assert!(format!("{scheduler:?}").contains("queued: 0"));
    }

    #[test]
    fn test_cancelled_before_run() {
        let mut scheduler = scheduler();
        let mut log = Vec::new();
        let handle = scheduler.add(|log| log.push("never"));
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(scheduler.update(&mut log, 0.0), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_sender_from_other_thread() {
        let mut scheduler = scheduler();
        let sender = scheduler.sender();
        std::thread::spawn(move || {
            sender.add(|log| log.push("remote"));
            sender.add_delayed(5.0, false, |log| log.push("remote-late"));
        })
        .join()
        .expect("sender thread panicked");

        let mut log = Vec::new();
        scheduler.update(&mut log, 100.0);
        assert_eq!(log, vec!["remote"]);
        scheduler.update(&mut log, 105.0);
        assert_eq!(log, vec!["remote", "remote-late"]);
    }
}
