//! # Headless Soak
//!
//! Runs a moving sprite field through the full pipeline against the
//! recording device, with an input thread adding and removing sprites.
//!
//! ```text
//! headless_soak [seconds] [pipeline.toml]
//! ```
//!
//! Log level comes from `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use canopy::{App, GameHost, HostError, UpdateContext};
use canopy_core::{Counter, CoreResult, NodeId, PipelineConfig, Primitive, Rect, Rgba, TextureId};
use canopy_rendering::RecordingDevice;
use glam::Vec2;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const COLUMNS: usize = 40;
const SPRITE: f32 = 12.0;

/// Sent by the input thread.
#[derive(Debug, Clone, Copy)]
enum SoakInput {
    Spawn(u32),
    Despawn(u32),
}

/// A row container per spawn burst; every sprite spins around its row origin.
#[derive(Default)]
struct SpriteField {
    rows: Vec<NodeId>,
    sprites: Vec<NodeId>,
}

impl SpriteField {
    fn spawn_row(&mut self, ctx: &mut UpdateContext<'_>, count: u32) -> CoreResult<()> {
        let root = ctx.tree.root();
        let row = ctx.tree.create_container()?;
        ctx.tree.attach(root, row)?;
        ctx.tree
            .set_position(row, Vec2::new(0.0, self.rows.len() as f32 * SPRITE * 1.5))?;
        for i in 0..count as usize {
            let texture = TextureId(1 + (i % 3) as u32);
            let sprite = ctx.tree.create_leaf(Primitive::Quad { texture, uv: Rect::UNIT })?;
            ctx.tree.attach(row, sprite)?;
            ctx.tree.set_size(sprite, Vec2::splat(SPRITE))?;
            ctx.tree
                .set_position(sprite, Vec2::new((i % COLUMNS) as f32 * SPRITE * 1.5, 0.0))?;
            let shade = (i % COLUMNS) as f32 / COLUMNS as f32;
            ctx.tree.set_colour(sprite, Rgba::rgb(0.3, 0.4 + 0.6 * shade, 0.3))?;
            self.sprites.push(sprite);
        }
        self.rows.push(row);
        Ok(())
    }

    fn despawn_rows(&mut self, ctx: &mut UpdateContext<'_>, count: u32) -> CoreResult<()> {
        for _ in 0..count {
            let Some(row) = self.rows.pop() else {
                break;
            };
            ctx.tree.remove(row)?;
        }
        self.sprites.retain(|&sprite| ctx.tree.contains(sprite));
        Ok(())
    }
}

impl App for SpriteField {
    type Input = SoakInput;

    fn load(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        for _ in 0..4 {
            self.spawn_row(ctx, COLUMNS as u32)?;
        }
        // Blink the first row twice a second.
        if let Some(&row) = self.rows.first() {
            let mut visible = true;
            ctx.scheduler.add_delayed(500.0, true, move |tree| {
                visible = !visible;
                let _ = tree.set_alpha(row, if visible { 1.0 } else { 0.0 });
            });
        }
        Ok(())
    }

    fn input(&mut self, ctx: &mut UpdateContext<'_>, event: SoakInput) -> CoreResult<()> {
        match event {
            SoakInput::Spawn(count) => self.spawn_row(ctx, count),
            SoakInput::Despawn(count) => self.despawn_rows(ctx, count),
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        // Only a tenth of the sprites move per tick; the rest copy forward.
        let phase = (ctx.now_ms() / 1000.0) as f32;
        let stride = 10;
        let offset = (ctx.tick % stride) as usize;
        for &sprite in self.sprites.iter().skip(offset).step_by(stride as usize) {
            ctx.tree.set_rotation(sprite, phase)?;
        }
        Ok(())
    }
}

fn parse_args() -> Result<(Duration, PipelineConfig), HostError> {
    let mut args = std::env::args().skip(1);
    let seconds = args.next().and_then(|s| s.parse().ok()).unwrap_or(5);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig {
            update_rate_hz: 240,
            draw_rate_hz: 60,
            ..PipelineConfig::default()
        },
    };
    Ok((Duration::from_secs(seconds), config))
}

fn run() -> Result<(), HostError> {
    let (duration, config) = parse_args()?;
    info!(?duration, ?config, "starting headless soak");

    let host = GameHost::run(SpriteField::default(), RecordingDevice::counting(), config)?;

    let input = host.input_sender();
    let feeder = thread::Builder::new()
        .name("soak-input".into())
        .spawn(move || {
            let mut burst = 0_u32;
            loop {
                thread::sleep(Duration::from_millis(250));
                burst += 1;
                let event = if burst % 3 == 0 {
                    SoakInput::Despawn(1)
                } else {
                    SoakInput::Spawn(COLUMNS as u32)
                };
                if !input.send(event) {
                    break;
                }
            }
        })
        .map_err(|source| HostError::Spawn {
            thread: "soak-input",
            source,
        })?;

    let started = std::time::Instant::now();
    while started.elapsed() < duration && host.is_running() {
        thread::sleep(Duration::from_secs(1));
        let last = host.last_draw();
        info!(
            generation = host.latest_generation(),
            drawn = last.generation,
            draw_calls = last.draw_calls,
            vertices = last.vertices,
            "soak"
        );
    }

    let report = host.shutdown()?;
    // The sender fails once the update thread's queue is gone.
    let _ = feeder.join();

    info!(
        frames = report.frames_drawn,
        generations = report.generations_published,
        rebuilt = report.counter(Counter::DrawNodesRebuilt),
        copied = report.counter(Counter::DrawNodesCopied),
        stalls = report.counter(Counter::BackpressureStalls),
        reuses = report.counter(Counter::BufferReuses),
        presented = report.device.frames_presented(),
        "soak finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "soak failed");
            ExitCode::FAILURE
        }
    }
}
