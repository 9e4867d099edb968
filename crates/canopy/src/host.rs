//! # Game Host
//!
//! ```text
//! canopy-update                              canopy-draw
//! ─────────────                              ───────────
//! advance clock                              wait_for_newer(seen)
//! drain input    → App::input                  ↓
//! scheduler.update                           read_latest (slot read lock)
//! App::update                                  ↓
//! begin_write ── Backpressure? retry         Renderer::draw_frame → present
//! build_into + publish ─────── generation ──→  ↓
//! sleep to next tick                         pace to draw_rate_hz
//! ```
//!
//! Shutdown sets one flag and wakes the draw thread's idle wait; both loops
//! check the flag once per iteration and the update thread also checks it
//! between backpressure retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use canopy_core::{
    AtomicStats, Counter, FrameClock, InputQueue, InputSender, PipelineConfig, SceneTree, Scheduler,
    SchedulerSender, Telemetry,
};
use canopy_rendering::{DrawStats, RenderDevice, RenderError, Renderer, SnapshotBuilder, SnapshotRing};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::app::{App, UpdateContext};
use crate::error::{HostError, HostResult};

/// Name of the thread that owns the tree.
pub const UPDATE_THREAD: &str = "canopy-update";

/// Name of the thread that owns the device.
pub const DRAW_THREAD: &str = "canopy-draw";

/// State both pipeline threads and the handle can see.
struct Shared {
    config: PipelineConfig,
    ring: SnapshotRing,
    clock: FrameClock,
    stats: Arc<AtomicStats>,
    telemetry: Telemetry,
    last_draw: Mutex<DrawStats>,
    shutdown: AtomicBool,
}

impl Shared {
    fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.ring.wake_all();
    }
}

/// Starts pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct GameHost;

impl GameHost {
    /// Validates `config`, spawns the draw and update threads and returns
    /// once `app` has loaded.
    ///
    /// # Errors
    ///
    /// Invalid config, a failed spawn, or an error from [`App::load`]. The
    /// threads are joined before any error is returned.
    pub fn run<A, D>(app: A, device: D, config: PipelineConfig) -> HostResult<HostHandle<A::Input, D>>
    where
        A: App,
        D: RenderDevice + Send + 'static,
    {
        config.validate()?;
        let stats = Arc::new(AtomicStats::new());
        let telemetry = Telemetry::new(stats.clone());
        let shared = Arc::new(Shared {
            ring: SnapshotRing::new(config.ring_depth, config.backpressure_timeout(), telemetry.clone()),
            clock: FrameClock::new(),
            stats,
            last_draw: Mutex::new(DrawStats::default()),
            shutdown: AtomicBool::new(false),
            telemetry: telemetry.clone(),
            config,
        });

        let input = InputQueue::new(telemetry.clone());
        let input_sender = input.sender();
        let scheduler = Scheduler::new(shared.config.scheduler_timed_task_limit, telemetry);
        let scheduler_sender = scheduler.sender();

        let draw_shared = Arc::clone(&shared);
        let draw = thread::Builder::new()
            .name(DRAW_THREAD.into())
            .spawn(move || guarded(&draw_shared, draw_loop(device, &draw_shared)))
            .map_err(|source| HostError::Spawn {
                thread: DRAW_THREAD,
                source,
            })?;

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let update_shared = Arc::clone(&shared);
        let draw_id = draw.thread().id();
        let spawned = thread::Builder::new().name(UPDATE_THREAD.into()).spawn(move || {
            let worker = UpdateWorker {
                app,
                input,
                scheduler,
                shared: &update_shared,
            };
            guarded(&update_shared, worker.run(draw_id, &ready_tx))
        });
        let update = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                shared.stop();
                let _ = draw.join();
                return Err(HostError::Spawn {
                    thread: UPDATE_THREAD,
                    source,
                });
            }
        };

        let mut handle = HostHandle {
            input: input_sender,
            scheduler: scheduler_sender,
            shared,
            threads: Some(Threads { update, draw }),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(ring_depth = handle.shared.config.ring_depth, "pipeline running");
                Ok(handle)
            }
            Ok(Err(err)) => {
                let _ = handle.stop_and_join();
                Err(err)
            }
            Err(_) => Err(handle.stop_and_join().err().unwrap_or(HostError::LoadAborted)),
        }
    }
}

/// Stops the pipeline when a thread body fails, so the other thread exits.
fn guarded<T>(shared: &Shared, result: HostResult<T>) -> HostResult<T> {
    if let Err(err) = &result {
        error!(%err, thread = ?thread::current().name(), "pipeline thread failed");
        shared.stop();
    }
    result
}

struct UpdateWorker<'s, A: App> {
    app: A,
    input: InputQueue<A::Input>,
    scheduler: Scheduler<SceneTree>,
    shared: &'s Shared,
}

impl<A: App> UpdateWorker<'_, A> {
    /// Loads the app, reports readiness, then ticks until shutdown. Returns
    /// the number of generations published.
    fn run(mut self, draw_id: ThreadId, ready: &crossbeam_channel::Sender<HostResult<()>>) -> HostResult<u64> {
        let mut tree = SceneTree::new().with_telemetry(self.shared.telemetry.clone());
        tree.bind_to_current_thread();
        tree.guard_mut().register_draw_thread(draw_id);

        let loaded = self.app.load(&mut UpdateContext {
            tree: &mut tree,
            scheduler: &mut self.scheduler,
            clock: &self.shared.clock,
            tick: 0,
            delta_ms: 0.0,
        });
        if let Err(err) = loaded {
            // The caller reports the load error; this thread exits quietly.
            let _ = ready.send(Err(err.into()));
            return Ok(0);
        }
        let _ = ready.send(Ok(()));

        let mut builder = SnapshotBuilder::new(self.shared.telemetry.clone());
        let mut events = Vec::new();
        let interval = self.shared.config.update_interval();
        let started = Instant::now();
        let mut next_tick = started;
        let mut published = 0;

        while !self.shared.is_stopping() {
            let now_ms = started.elapsed().as_secs_f64() * 1000.0;
            let delta_ms = self.shared.clock.advance_to(now_ms);
            let tick = self.shared.clock.frame_count();

            events.clear();
            self.input.drain_into(&mut events);
            let mut ctx = UpdateContext {
                tree: &mut tree,
                scheduler: &mut self.scheduler,
                clock: &self.shared.clock,
                tick,
                delta_ms,
            };
            for event in events.drain(..) {
                self.app.input(&mut ctx, event)?;
            }

            self.scheduler.update(&mut tree, now_ms);
            self.app.update(&mut UpdateContext {
                tree: &mut tree,
                scheduler: &mut self.scheduler,
                clock: &self.shared.clock,
                tick,
                delta_ms,
            })?;

            if publish(self.shared, &mut builder, &mut tree, now_ms)?.is_some() {
                published += 1;
            }

            next_tick += interval;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }

        debug!(published, "update thread stopped");
        Ok(published)
    }
}

/// Builds the tree into the next ring slot and publishes it, retrying
/// backpressure until the draw thread frees the slot or shutdown begins.
/// Returns the published generation, or `None` when shutdown won.
fn publish(shared: &Shared, builder: &mut SnapshotBuilder, tree: &mut SceneTree, now_ms: f64) -> HostResult<Option<u64>> {
    loop {
        match shared.ring.begin_write() {
            Ok(mut writer) => {
                writer.snapshot().frame_time_ms = now_ms;
                builder.build_into(tree, writer.snapshot())?;
                let generation = writer.generation();
                writer.publish();
                return Ok(Some(generation));
            }
            Err(RenderError::Backpressure { .. }) if !shared.is_stopping() => {}
            Err(RenderError::Backpressure { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        }
    }
}

/// Draws each new generation until shutdown. Returns the device and the
/// number of frames drawn.
fn draw_loop<D: RenderDevice>(device: D, shared: &Shared) -> HostResult<(D, u64)> {
    let mut renderer = Renderer::new(device, &shared.config, shared.telemetry.clone());
    let idle = shared.config.backpressure_timeout().max(Duration::from_millis(1));
    let pacing = shared.config.draw_interval();
    let mut seen = 0;

    while !shared.is_stopping() {
        if shared.ring.wait_for_newer(seen, idle).is_none() {
            continue;
        }
        let frame_started = Instant::now();
        let stats = {
            let Some(snapshot) = shared.ring.read_latest() else {
                continue;
            };
            renderer.draw_frame(&snapshot)?
        };
        seen = stats.generation;
        *shared.last_draw.lock() = stats;

        if let Some(interval) = pacing {
            let spent = frame_started.elapsed();
            if spent < interval {
                thread::sleep(interval - spent);
            }
        }
    }

    let frames = renderer.frames();
    debug!(frames, "draw thread stopped");
    Ok((renderer.into_device(), frames))
}

struct Threads<D> {
    update: JoinHandle<HostResult<u64>>,
    draw: JoinHandle<HostResult<(D, u64)>>,
}

/// What a stopped pipeline hands back.
#[derive(Debug)]
pub struct HostReport<D> {
    /// The device, with everything it recorded.
    pub device: D,
    /// Frames the draw thread drew.
    pub frames_drawn: u64,
    /// Generations the update thread published.
    pub generations_published: u64,
    /// Stats of the last drawn frame.
    pub last_draw: DrawStats,
    /// Final counter values.
    pub counters: [(Counter, u64); Counter::COUNT],
}

impl<D> HostReport<D> {
    /// Final value of one counter.
    #[must_use]
    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters
            .iter()
            .find(|(c, _)| *c == counter)
            .map_or(0, |(_, value)| *value)
    }
}

/// Running pipeline. Dropping it stops and joins both threads.
pub struct HostHandle<I, D> {
    input: InputSender<I>,
    scheduler: SchedulerSender<SceneTree>,
    shared: Arc<Shared>,
    threads: Option<Threads<D>>,
}

impl<I, D> HostHandle<I, D> {
    /// A producer for input threads.
    #[must_use]
    pub fn input_sender(&self) -> InputSender<I> {
        self.input.clone()
    }

    /// Submits work that runs on the update thread at its next tick.
    #[must_use]
    pub fn scheduler(&self) -> SchedulerSender<SceneTree> {
        self.scheduler.clone()
    }

    /// Live counters.
    #[must_use]
    pub fn stats(&self) -> &AtomicStats {
        &self.shared.stats
    }

    /// Shared clock, readable from any thread.
    #[must_use]
    pub fn clock(&self) -> &FrameClock {
        &self.shared.clock
    }

    /// Latest published generation.
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.shared.ring.latest_generation()
    }

    /// Stats of the most recently drawn frame.
    #[must_use]
    pub fn last_draw(&self) -> DrawStats {
        *self.shared.last_draw.lock()
    }

    /// False once either thread has stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shared.is_stopping()
            && self
                .threads
                .as_ref()
                .is_some_and(|t| !t.update.is_finished() && !t.draw.is_finished())
    }

    /// Blocks until at least `generation` has been drawn or `timeout` passes.
    /// Returns true when it was drawn.
    #[must_use]
    pub fn wait_for_drawn(&self, generation: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.last_draw().generation >= generation {
                return true;
            }
            if Instant::now() >= deadline || !self.is_running() {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stops both threads, joins them and returns the report.
    ///
    /// # Errors
    ///
    /// The first error either thread stopped with, or
    /// [`HostError::ThreadPanicked`].
    pub fn shutdown(mut self) -> HostResult<HostReport<D>> {
        let (generations_published, (device, frames_drawn)) = self.stop_and_join()?;
        let report = HostReport {
            device,
            frames_drawn,
            generations_published,
            last_draw: self.last_draw(),
            counters: self.shared.stats.snapshot(),
        };
        info!(
            frames = report.frames_drawn,
            generations = report.generations_published,
            stalls = report.counter(Counter::BackpressureStalls),
            "pipeline stopped"
        );
        Ok(report)
    }

    fn stop_and_join(&mut self) -> HostResult<(u64, (D, u64))> {
        self.shared.stop();
        let threads = self.threads.take().ok_or(HostError::Stopped)?;
        let update = threads.update.join().map_err(|_| HostError::ThreadPanicked(UPDATE_THREAD));
        let draw = threads.draw.join().map_err(|_| HostError::ThreadPanicked(DRAW_THREAD));
        Ok((update??, draw??))
    }
}

impl<I, D> Drop for HostHandle<I, D> {
    fn drop(&mut self) {
        if self.threads.is_some() {
            let _ = self.stop_and_join();
        }
    }
}

impl<I, D> std::fmt::Debug for HostHandle<I, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("latest_generation", &self.latest_generation())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
