//! Vertex batching over a rotating pool of GPU buffers.
//!
//! ```text
//! push → [staging: drawn | pending] → draw() uploads pending, draws it
//!                                     spill() = draw() + rotate buffer
//! ```
//!
//! Vertices before the draw cursor are already on the GPU and are never
//! uploaded or drawn again.

use std::marker::PhantomData;

use bytemuck::Pod;
use canopy_core::{Counter, Telemetry};
use tracing::{trace, warn};

use super::{PipelineState, TexturedVertex};
use crate::device::RenderDevice;
use crate::error::{RenderError, RenderResult};

/// Why a batch was spilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillReason {
    /// The active buffer has no room for the next vertex or primitive.
    Full,
    /// The next vertex needs a different pipeline state.
    StateChange,
}

/// Per-frame batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Draw calls issued.
    pub draw_calls: u32,
    /// Vertices uploaded.
    pub vertices: u32,
    /// Spills caused by a full buffer.
    pub full_spills: u32,
    /// Spills caused by a state change.
    pub state_spills: u32,
    /// Rotations onto a buffer already written this frame.
    pub buffer_reuses: u32,
}

impl BatchStats {
    /// All spills.
    #[must_use]
    pub fn spills(&self) -> u32 {
        self.full_spills + self.state_spills
    }
}

type SpillListener = Box<dyn FnMut(SpillReason) + Send>;

/// Accumulates vertices of one pipeline state and flushes them as one draw.
///
/// Buffers are created lazily up to `max_buffers`; a full buffer rotates to
/// `(i + 1) % max_buffers`. Wrapping onto a buffer written earlier in the
/// same frame is counted as a reuse and flushes the device first, so the
/// earlier draws are submitted before their vertices are overwritten.
pub struct VertexBatch<D: RenderDevice, V: Pod = TexturedVertex> {
    buffers: Vec<D::VertexBuffer>,
    staging: Vec<V>,
    capacity: usize,
    max_buffers: usize,
    current: usize,
    draw_cursor: usize,
    state: Option<PipelineState>,
    used_this_frame: Vec<bool>,
    reuse_warned: bool,
    stats: BatchStats,
    on_spill: Option<SpillListener>,
    telemetry: Telemetry,
    _vertex: PhantomData<V>,
}

impl<D: RenderDevice, V: Pod> VertexBatch<D, V> {
    /// A batch of `max_buffers` buffers holding `capacity` vertices each.
    /// Zero values are raised to one.
    #[must_use]
    pub fn new(capacity: usize, max_buffers: usize, telemetry: Telemetry) -> Self {
        let capacity = capacity.max(1);
        let max_buffers = max_buffers.max(1);
        Self {
            buffers: Vec::with_capacity(max_buffers),
            staging: Vec::with_capacity(capacity),
            capacity,
            max_buffers,
            current: 0,
            draw_cursor: 0,
            state: None,
            used_this_frame: vec![false; max_buffers],
            reuse_warned: false,
            stats: BatchStats::default(),
            on_spill: None,
            telemetry,
            _vertex: PhantomData,
        }
    }

    /// Installs a listener called on every spill.
    pub fn set_spill_listener(&mut self, listener: impl FnMut(SpillReason) + Send + 'static) {
        self.on_spill = Some(Box::new(listener));
    }

    /// Vertices per buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index of the active buffer.
    #[must_use]
    pub fn current_buffer(&self) -> usize {
        self.current
    }

    /// Vertices pushed but not yet drawn.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.staging.len() - self.draw_cursor
    }

    /// Counters for the frame so far.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Starts a frame on the next buffer so the previous frame's last buffer
    /// is not rewritten while it may still be in flight.
    pub fn begin_frame(&mut self) {
        if !self.staging.is_empty() {
            self.current = (self.current + 1) % self.max_buffers;
        }
        self.staging.clear();
        self.draw_cursor = 0;
        self.state = None;
        self.used_this_frame.fill(false);
        self.used_this_frame[self.current] = true;
        self.reuse_warned = false;
        self.stats = BatchStats::default();
    }

    /// Appends one vertex drawn with `state`.
    ///
    /// Spills first if the state differs from the pending vertices' or the
    /// buffer is full.
    ///
    /// # Errors
    ///
    /// Device errors from the implied spill.
    #[inline]
    pub fn push(&mut self, device: &mut D, state: &PipelineState, vertex: V) -> RenderResult<()> {
        self.prepare(device, state, 1)?;
        self.staging.push(vertex);
        Ok(())
    }

    /// Appends a whole primitive; it never straddles two buffers.
    ///
    /// # Errors
    ///
    /// [`RenderError::PrimitiveTooLarge`] if it cannot fit any buffer,
    /// otherwise device errors from the implied spill.
    pub fn push_primitive(&mut self, device: &mut D, state: &PipelineState, vertices: &[V]) -> RenderResult<()> {
        if vertices.len() > self.capacity {
            return Err(RenderError::PrimitiveTooLarge {
                vertices: vertices.len(),
                capacity: self.capacity,
            });
        }
        if vertices.is_empty() {
            return Ok(());
        }
        self.prepare(device, state, vertices.len())?;
        self.staging.extend_from_slice(vertices);
        Ok(())
    }

    fn prepare(&mut self, device: &mut D, state: &PipelineState, count: usize) -> RenderResult<()> {
        if self.state.as_ref() != Some(state) {
            if self.pending() > 0 {
                self.spill_for(device, SpillReason::StateChange)?;
            }
            self.state = Some(*state);
        }
        if self.staging.len() + count > self.capacity {
            self.spill_for(device, SpillReason::Full)?;
        }
        Ok(())
    }

    /// Uploads and draws the pending vertices as one draw call.
    ///
    /// Returns the number of vertices drawn.
    ///
    /// # Errors
    ///
    /// Device errors.
    pub fn draw(&mut self, device: &mut D) -> RenderResult<usize> {
        let count = self.pending();
        if count == 0 {
            return Ok(0);
        }
        let Some(state) = self.state else {
            return Ok(0);
        };
        if self.current >= self.buffers.len() {
            for _ in self.buffers.len()..=self.current {
                let size = (self.capacity * std::mem::size_of::<V>()) as u64;
                let buffer = device.create_vertex_buffer(size)?;
                self.buffers.push(buffer);
            }
        }
        let buffer = &self.buffers[self.current];
        let offset = (self.draw_cursor * std::mem::size_of::<V>()) as u64;
        let bytes: &[u8] = bytemuck::cast_slice(&self.staging[self.draw_cursor..]);
        device.upload_vertices(buffer, offset, bytes)?;
        let range = self.draw_cursor as u32..self.staging.len() as u32;
        device.draw(buffer, range, &state)?;

        self.draw_cursor = self.staging.len();
        self.stats.draw_calls += 1;
        self.stats.vertices += count as u32;
        self.telemetry.incr(Counter::DrawCalls);
        self.telemetry.add(Counter::VerticesUploaded, count as u64);
        Ok(count)
    }

    /// Draws pending vertices and rotates to the next buffer.
    ///
    /// # Errors
    ///
    /// Device errors.
    pub fn spill(&mut self, device: &mut D) -> RenderResult<()> {
        self.spill_for(device, SpillReason::Full)
    }

    fn spill_for(&mut self, device: &mut D, reason: SpillReason) -> RenderResult<()> {
        self.draw(device)?;
        self.telemetry.incr(Counter::VertexSpills);
        if let Some(listener) = self.on_spill.as_mut() {
            listener(reason);
        }
        match reason {
            SpillReason::StateChange => {
                self.stats.state_spills += 1;
            }
            SpillReason::Full => {
                self.stats.full_spills += 1;
                self.rotate(device)?;
            }
        }
        trace!(?reason, buffer = self.current, "batch spilled");
        Ok(())
    }

    fn rotate(&mut self, device: &mut D) -> RenderResult<()> {
        self.current = (self.current + 1) % self.max_buffers;
        self.staging.clear();
        self.draw_cursor = 0;
        if self.used_this_frame[self.current] {
            device.flush()?;
            self.stats.buffer_reuses += 1;
            self.telemetry.incr(Counter::BufferReuses);
            if !self.reuse_warned {
                self.reuse_warned = true;
                warn!(
                    buffer = self.current,
                    max_buffers = self.max_buffers,
                    "vertex buffers exhausted this frame, reusing"
                );
            }
        }
        self.used_this_frame[self.current] = true;
        Ok(())
    }

    /// Draws whatever is pending and returns the frame's counters.
    ///
    /// # Errors
    ///
    /// Device errors.
    pub fn end_frame(&mut self, device: &mut D) -> RenderResult<BatchStats> {
        self.draw(device)?;
        Ok(self.stats)
    }
}

impl<D: RenderDevice, V: Pod> std::fmt::Debug for VertexBatch<D, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBatch")
            .field("capacity", &self.capacity)
            .field("max_buffers", &self.max_buffers)
            .field("current", &self.current)
            .field("pending", &self.pending())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCommand, RecordingDevice};
    use canopy_core::{AtomicStats, TextureId};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn solid() -> PipelineState {
        PipelineState::for_texture(TextureId::WHITE, None)
    }

    fn textured(id: u32) -> PipelineState {
        PipelineState::for_texture(TextureId(id), None)
    }

    fn vertex(x: f32) -> TexturedVertex {
        TexturedVertex {
            position: [x, 0.0],
            ..TexturedVertex::default()
        }
    }

    fn batch(capacity: usize, max_buffers: usize) -> VertexBatch<RecordingDevice> {
        let mut batch = VertexBatch::new(capacity, max_buffers, Telemetry::disabled());
        batch.begin_frame();
        batch
    }

    #[test]
    fn test_draw_never_resubmits() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(12, 2);
        for i in 0..3 {
            batch.push(&mut device, &solid(), vertex(i as f32)).unwrap();
        }
        assert_eq!(batch.draw(&mut device).unwrap(), 3);
        assert_eq!(batch.draw(&mut device).unwrap(), 0);
        for i in 3..6 {
            batch.push(&mut device, &solid(), vertex(i as f32)).unwrap();
        }
        batch.end_frame(&mut device).unwrap();

        let draws: Vec<_> = device.draws().map(|(b, r, _)| (b, r.clone())).collect();
        assert_eq!(draws, vec![(0, 0..3), (0, 3..6)]);
        let uploaded: Vec<TexturedVertex> = device.read_vertices(0, 0..6);
        assert_eq!(uploaded[4].position, [4.0, 0.0]);
    }

    #[test]
    fn test_state_change_spills_without_mixing() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(12, 2);
        batch.push(&mut device, &textured(1), vertex(0.0)).unwrap();
        batch.push(&mut device, &textured(1), vertex(1.0)).unwrap();
        batch.push(&mut device, &textured(2), vertex(2.0)).unwrap();
        let stats = batch.end_frame(&mut device).unwrap();

        let states: Vec<_> = device.draws().map(|(_, r, s)| (r.clone(), s.texture)).collect();
        assert_eq!(states, vec![(0..2, TextureId(1)), (2..3, TextureId(2))]);
        assert_eq!(stats.state_spills, 1);
        assert_eq!(stats.draw_calls, 2);
    }

    #[test]
    fn test_full_buffer_rotates() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(4, 3);
        for i in 0..10 {
            batch.push(&mut device, &solid(), vertex(i as f32)).unwrap();
        }
        let stats = batch.end_frame(&mut device).unwrap();

        let draws: Vec<_> = device.draws().map(|(b, r, _)| (b, r.clone())).collect();
        assert_eq!(draws, vec![(0, 0..4), (1, 0..4), (2, 0..2)]);
        assert_eq!(stats.full_spills, 2);
        assert_eq!(stats.buffer_reuses, 0);
        assert_eq!(stats.vertices, 10);
    }

    #[test]
    fn test_wrapping_counts_reuse() {
        let stats_sink = Arc::new(AtomicStats::new());
        let mut device = RecordingDevice::new();
        let mut batch: VertexBatch<RecordingDevice> = VertexBatch::new(2, 2, Telemetry::new(stats_sink.clone()));
        batch.begin_frame();
        for i in 0..7 {
            batch.push(&mut device, &solid(), vertex(i as f32)).unwrap();
        }
        let stats = batch.end_frame(&mut device).unwrap();

        assert_eq!(device.buffer_count(), 2);
        assert_eq!(stats.buffer_reuses, 2);
        assert_eq!(stats_sink.get(Counter::BufferReuses), 2);
        assert_eq!(stats_sink.get(Counter::VertexSpills), 3);
        assert_eq!(stats_sink.get(Counter::DrawCalls), 4);
    }

    #[test]
    fn test_reused_buffer_is_flushed_before_overwrite() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(2, 2);
        for i in 0..6 {
            batch.push(&mut device, &solid(), vertex(i as f32)).unwrap();
        }
        let stats = batch.end_frame(&mut device).unwrap();
        device.present().unwrap();

        assert_eq!(stats.buffer_reuses, 1);
        assert_eq!(device.flushes(), 1);
        let drawn: Vec<f32> = device
            .submitted_vertices::<TexturedVertex>()
            .iter()
            .map(|v| v.position[0])
            .collect();
        assert_eq!(drawn, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_primitive_never_straddles() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(6, 2);
        let quad = [vertex(0.0); 6];
        batch.push(&mut device, &solid(), vertex(0.0)).unwrap();
        batch.push_primitive(&mut device, &solid(), &quad).unwrap();
        batch.end_frame(&mut device).unwrap();

        let draws: Vec<_> = device.draws().map(|(b, r, _)| (b, r.clone())).collect();
        assert_eq!(draws, vec![(0, 0..1), (1, 0..6)]);
    }

    #[test]
    fn test_oversized_primitive_is_rejected() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(3, 2);
        let err = batch.push_primitive(&mut device, &solid(), &[vertex(0.0); 6]);
        assert_eq!(err, Err(RenderError::PrimitiveTooLarge { vertices: 6, capacity: 3 }));
        assert!(device.commands().is_empty());
    }

    #[test]
    fn test_spill_listener_sees_reasons() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(2, 4);
        let spills = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&spills);
        batch.set_spill_listener(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        batch.push(&mut device, &solid(), vertex(0.0)).unwrap();
        batch.push(&mut device, &textured(3), vertex(1.0)).unwrap();
        batch.push(&mut device, &textured(3), vertex(2.0)).unwrap();
        batch.end_frame(&mut device).unwrap();
        assert_eq!(spills.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_next_frame_starts_on_fresh_buffer() {
        let mut device = RecordingDevice::new();
        let mut batch = batch(8, 3);
        batch.push(&mut device, &solid(), vertex(0.0)).unwrap();
        batch.end_frame(&mut device).unwrap();
        batch.begin_frame();
        batch.push(&mut device, &solid(), vertex(1.0)).unwrap();
        batch.end_frame(&mut device).unwrap();

        assert!(matches!(
            device.commands().last(),
            Some(DeviceCommand::Draw { buffer: 1, .. })
        ));
    }
}
