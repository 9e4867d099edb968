//! Snapshot to draw calls.

use std::time::Instant;

use canopy_core::{PipelineConfig, Primitive, Telemetry};
use glam::Vec2;
use tracing::{debug, trace};

use super::DrawStats;
use crate::batch::{PipelineState, TexturedVertex, VertexBatch};
use crate::device::RenderDevice;
use crate::error::RenderResult;
use crate::snapshot::{DrawNode, FrameSnapshot};

/// Appends `node`'s world-space vertices to `out`.
///
/// A quad covers the draw size as two triangles; a mesh's triangles are
/// transformed and get UVs from their position over the draw size.
pub fn emit_vertices(node: &DrawNode, out: &mut Vec<TexturedVertex>) {
    let colour = node.colour;
    match &node.primitive {
        Primitive::None => {}
        Primitive::Quad { uv, .. } => {
            let size = node.size;
            let corners = [
                (Vec2::ZERO, uv.min()),
                (Vec2::new(size.x, 0.0), Vec2::new(uv.right(), uv.y)),
                (size, uv.max()),
                (Vec2::new(0.0, size.y), Vec2::new(uv.x, uv.bottom())),
            ];
            for index in [0, 1, 2, 0, 2, 3] {
                let (local, tex) = corners[index];
                out.push(TexturedVertex::new(node.transform.transform_point2(local), tex, colour));
            }
        }
        Primitive::Mesh { triangles, .. } => {
            let whole = triangles.len() - triangles.len() % 3;
            let inverse = Vec2::new(recip_or_zero(node.size.x), recip_or_zero(node.size.y));
            for &local in &triangles[..whole] {
                out.push(TexturedVertex::new(
                    node.transform.transform_point2(local),
                    local * inverse,
                    colour,
                ));
            }
        }
    }
}

fn recip_or_zero(value: f32) -> f32 {
    if value == 0.0 {
        0.0
    } else {
        value.recip()
    }
}

/// Draw-thread renderer: owns the device and the vertex batch.
pub struct Renderer<D: RenderDevice> {
    device: D,
    batch: VertexBatch<D>,
    scratch: Vec<TexturedVertex>,
    frames: u64,
}

impl<D: RenderDevice> Renderer<D> {
    /// Creates a renderer sized from `config`.
    #[must_use]
    pub fn new(device: D, config: &PipelineConfig, telemetry: Telemetry) -> Self {
        Self {
            device,
            batch: VertexBatch::new(config.vertex_buffer_capacity, config.max_vertex_buffers, telemetry),
            scratch: Vec::with_capacity(64),
            frames: 0,
        }
    }

    /// The device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Gives the device back.
    #[must_use]
    pub fn into_device(self) -> D {
        self.device
    }

    /// Frames drawn so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The batch, for installing a spill listener.
    pub fn batch_mut(&mut self) -> &mut VertexBatch<D> {
        &mut self.batch
    }

    /// Draws one published snapshot and presents it.
    ///
    /// # Errors
    ///
    /// Device errors, or [`crate::RenderError::PrimitiveTooLarge`] when the
    /// buffer capacity is below one quad.
    #[tracing::instrument(level = "trace", skip_all, fields(generation = snapshot.generation))]
    pub fn draw_frame(&mut self, snapshot: &FrameSnapshot) -> RenderResult<DrawStats> {
        debug_assert!(snapshot.is_consistent(), "torn snapshot for generation {}", snapshot.generation);
        let started = Instant::now();
        let mut stats = DrawStats {
            generation: snapshot.generation,
            ..DrawStats::default()
        };

        self.device.begin_frame(snapshot.generation)?;
        self.batch.begin_frame();

        let chunk = (self.batch.capacity() / 3 * 3).max(3);
        for node in &snapshot.nodes {
            let Some(texture) = node.primitive.texture() else {
                stats.nodes_skipped += 1;
                continue;
            };
            if node.is_empty() {
                stats.nodes_skipped += 1;
                continue;
            }
            let state = PipelineState::for_texture(texture, node.clip);
            if state.scissor.is_some_and(|scissor| scissor.is_empty()) {
                stats.nodes_skipped += 1;
                continue;
            }

            self.scratch.clear();
            emit_vertices(node, &mut self.scratch);
            match node.primitive {
                Primitive::Mesh { .. } => {
                    for triangles in self.scratch.chunks(chunk) {
                        self.batch.push_primitive(&mut self.device, &state, triangles)?;
                    }
                }
                _ => self.batch.push_primitive(&mut self.device, &state, &self.scratch)?,
            }
            stats.nodes_drawn += 1;
        }

        let batch = self.batch.end_frame(&mut self.device)?;
        self.device.present()?;
        self.frames += 1;

        stats.absorb(batch);
        stats.cpu_time_ms = started.elapsed().as_secs_f32() * 1000.0;
        if stats.buffer_reuses > 0 {
            debug!(generation = stats.generation, reuses = stats.buffer_reuses, "frame reused vertex buffers");
        }
        trace!(
            generation = stats.generation,
            draw_calls = stats.draw_calls,
            vertices = stats.vertices,
            "frame drawn"
        );
        Ok(stats)
    }
}

impl<D: RenderDevice + std::fmt::Debug> std::fmt::Debug for Renderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("device", &self.device)
            .field("batch", &self.batch)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}
