//! Draw statistics.

use crate::batch::BatchStats;

/// Statistics from one draw pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawStats {
    /// Generation drawn.
    pub generation: u64,
    /// Nodes that emitted vertices.
    pub nodes_drawn: u32,
    /// Nodes with nothing to emit or an empty scissor.
    pub nodes_skipped: u32,
    /// Number of draw calls.
    pub draw_calls: u32,
    /// Vertices uploaded.
    pub vertices: u32,
    /// Batch spills (full or state change).
    pub spills: u32,
    /// Rotations onto a buffer already used this frame.
    pub buffer_reuses: u32,
    /// CPU time spent in the pass, in milliseconds.
    pub cpu_time_ms: f32,
}

impl DrawStats {
    pub(crate) fn absorb(&mut self, batch: BatchStats) {
        self.draw_calls = batch.draw_calls;
        self.vertices = batch.vertices;
        self.spills = batch.spills();
        self.buffer_reuses = batch.buffer_reuses;
    }

    /// Vertices per draw call, zero when nothing was drawn.
    #[must_use]
    pub fn vertices_per_call(&self) -> f32 {
        if self.draw_calls > 0 {
            self.vertices as f32 / self.draw_calls as f32
        } else {
            0.0
        }
    }

    /// True when no buffer had to be reused mid-frame.
    #[must_use]
    pub fn buffers_ok(&self) -> bool {
        self.buffer_reuses == 0
    }
}
