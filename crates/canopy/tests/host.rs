//! Both pipeline threads end to end, against the recording device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use canopy::{App, GameHost, HostError, UpdateContext, UPDATE_THREAD};
use canopy_core::{ConfigError, CoreError, CoreResult, Counter, NodeId, PipelineConfig, Primitive};
use canopy_rendering::{RecordingDevice, TexturedVertex};
use glam::Vec2;

const WAIT: Duration = Duration::from_secs(5);

fn config() -> PipelineConfig {
    PipelineConfig {
        update_rate_hz: 200,
        ..PipelineConfig::default()
    }
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

/// One 10x10 quad that input events move.
#[derive(Default)]
struct Mover {
    quad: Option<NodeId>,
    inputs: Arc<AtomicUsize>,
    ticks: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

impl App for Mover {
    type Input = Vec2;

    fn load(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        let root = ctx.tree.root();
        let quad = ctx.tree.create_leaf(Primitive::solid_quad())?;
        ctx.tree.attach(root, quad)?;
        ctx.tree.set_size(quad, Vec2::splat(10.0))?;
        self.quad = Some(quad);
        Ok(())
    }

    fn input(&mut self, ctx: &mut UpdateContext<'_>, event: Vec2) -> CoreResult<()> {
        if let Some(quad) = self.quad {
            ctx.tree.set_position(quad, event)?;
        }
        self.inputs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update(&mut self, _ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        let ticks = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_after.is_some_and(|limit| ticks > limit) {
            return Err(CoreError::RootImmutable);
        }
        Ok(())
    }
}

#[test]
fn test_run_draw_and_shutdown() {
    let host = GameHost::run(Mover::default(), RecordingDevice::new(), config()).unwrap();
    assert!(host.wait_for_drawn(3, WAIT));
    assert!(host.is_running());

    let last = host.last_draw();
    assert_eq!(last.draw_calls, 1);
    assert_eq!(last.vertices, 6);

    let report = host.shutdown().unwrap();
    assert!(report.frames_drawn >= 3);
    assert!(report.generations_published >= report.last_draw.generation);
    assert_eq!(report.device.frames_presented(), report.frames_drawn);
    assert_eq!(report.counter(Counter::DrawCalls), report.frames_drawn);
}

#[test]
fn test_input_reaches_the_drawn_frame() {
    let inputs = Arc::new(AtomicUsize::new(0));
    let app = Mover {
        inputs: Arc::clone(&inputs),
        ..Mover::default()
    };
    let host = GameHost::run(app, RecordingDevice::new(), config()).unwrap();
    let sender = host.input_sender();

    assert!(sender.send(Vec2::new(20.0, 0.0)));
    assert!(sender.send(Vec2::new(50.0, 5.0)));
    assert!(wait_until(|| inputs.load(Ordering::SeqCst) == 2));
    // Any generation published after the input was applied carries it.
    let target = host.latest_generation() + 1;
    assert!(host.wait_for_drawn(target, WAIT));

    let report = host.shutdown().unwrap();
    assert!(report.counter(Counter::InputEventsDrained) >= 2);
    let (buffer, range, _) = report.device.draws().last().unwrap();
    let vertices: Vec<TexturedVertex> = report.device.read_vertices(buffer, range.clone());
    assert_eq!(vertices[0].position, [50.0, 5.0]);
    assert_eq!(vertices[2].position, [60.0, 15.0]);
}

#[test]
fn test_scheduled_work_runs_on_the_update_thread() {
    let host = GameHost::run(Mover::default(), RecordingDevice::counting(), config()).unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);
    host.scheduler().add(move |tree| {
        let name = thread::current().name().map(str::to_owned);
        let _ = tx.send((name, tree.len()));
    });

    let (name, nodes) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(name.as_deref(), Some(UPDATE_THREAD));
    assert_eq!(nodes, 2);
    host.shutdown().unwrap();
}

#[test]
fn test_invalid_config_is_rejected_before_spawning() {
    let bad = PipelineConfig {
        ring_depth: 1,
        ..PipelineConfig::default()
    };
    let result = GameHost::run(Mover::default(), RecordingDevice::counting(), bad);
    assert!(matches!(result, Err(HostError::Config(ConfigError::Invalid { .. }))));
}

struct FailsToLoad;

impl App for FailsToLoad {
    type Input = ();

    fn load(&mut self, _ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        Err(CoreError::RootImmutable)
    }

    fn update(&mut self, _ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        unreachable!("never loaded")
    }
}

#[test]
fn test_load_error_is_returned_from_run() {
    let result = GameHost::run(FailsToLoad, RecordingDevice::counting(), config());
    assert!(matches!(result, Err(HostError::Core(CoreError::RootImmutable))));
}

#[test]
fn test_update_error_stops_the_pipeline() {
    let app = Mover {
        fail_after: Some(5),
        ..Mover::default()
    };
    let host = GameHost::run(app, RecordingDevice::counting(), config()).unwrap();
    assert!(wait_until(|| !host.is_running()));
    assert!(host.latest_generation() <= 5);
    assert!(matches!(host.shutdown(), Err(HostError::Core(CoreError::RootImmutable))));
}

#[test]
fn test_drop_joins_both_threads() {
    let host = GameHost::run(Mover::default(), RecordingDevice::counting(), config()).unwrap();
    let sender = host.input_sender();
    assert!(host.wait_for_drawn(1, WAIT));

    drop(host);
    // The update thread's queue is gone once it has been joined.
    assert!(!sender.send(Vec2::ZERO));
}
