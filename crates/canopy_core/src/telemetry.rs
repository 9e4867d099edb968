//! Fire-and-forget pipeline counters.
//!
//! Emitters hold a [`Telemetry`] handle. Without a collector attached every
//! increment is a no-op, so behavior never depends on whether anyone listens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters emitted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Counter {
    /// Nodes visited by invalidation propagation.
    Invalidations,
    /// Layout cells recomputed on read.
    CacheRevalidations,
    /// Draw nodes rebuilt from tree state.
    DrawNodesRebuilt,
    /// Draw nodes copied forward from the previous build.
    DrawNodesCopied,
    /// Snapshot writes that timed out waiting for a slot.
    BackpressureStalls,
    /// Vertex buffer spills (full or state change).
    VertexSpills,
    /// Spills that wrapped onto a buffer already used this frame.
    BufferReuses,
    /// GPU draw calls issued.
    DrawCalls,
    /// Vertices uploaded to GPU buffers.
    VerticesUploaded,
    /// Scheduler tasks executed.
    ScheduledTasksRun,
    /// Input events drained by the update thread.
    InputEventsDrained,
}

impl Counter {
    /// Number of counters.
    pub const COUNT: usize = 11;

    /// All counters in declaration order.
    pub const ALL: [Counter; Self::COUNT] = [
        Counter::Invalidations,
        Counter::CacheRevalidations,
        Counter::DrawNodesRebuilt,
        Counter::DrawNodesCopied,
        Counter::BackpressureStalls,
        Counter::VertexSpills,
        Counter::BufferReuses,
        Counter::DrawCalls,
        Counter::VerticesUploaded,
        Counter::ScheduledTasksRun,
        Counter::InputEventsDrained,
    ];

    /// Stable snake-case name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Counter::Invalidations => "invalidations",
            Counter::CacheRevalidations => "cache_revalidations",
            Counter::DrawNodesRebuilt => "draw_nodes_rebuilt",
            Counter::DrawNodesCopied => "draw_nodes_copied",
            Counter::BackpressureStalls => "backpressure_stalls",
            Counter::VertexSpills => "vertex_spills",
            Counter::BufferReuses => "buffer_reuses",
            Counter::DrawCalls => "draw_calls",
            Counter::VerticesUploaded => "vertices_uploaded",
            Counter::ScheduledTasksRun => "scheduled_tasks_run",
            Counter::InputEventsDrained => "input_events_drained",
        }
    }
}

/// Receiver of counter increments.
pub trait StatsSink: Send + Sync {
    /// Adds `by` to `counter`. Must not block.
    fn increment(&self, counter: Counter, by: u64);
}

/// Lock-free collector backed by one atomic per counter.
#[derive(Debug, Default)]
pub struct AtomicStats {
    values: [AtomicU64; Counter::COUNT],
}

impl AtomicStats {
    /// Creates a zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one counter.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter as usize].load(Ordering::Relaxed)
    }

    /// Copies every counter out.
    #[must_use]
    pub fn snapshot(&self) -> [(Counter, u64); Counter::COUNT] {
        Counter::ALL.map(|c| (c, self.get(c)))
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for value in &self.values {
            value.store(0, Ordering::Relaxed);
        }
    }
}

impl StatsSink for AtomicStats {
    #[inline]
    fn increment(&self, counter: Counter, by: u64) {
        self.values[counter as usize].fetch_add(by, Ordering::Relaxed);
    }
}

/// Cloneable handle to an optional collector.
#[derive(Clone, Default)]
pub struct Telemetry {
    sink: Option<Arc<dyn StatsSink>>,
}

impl Telemetry {
    /// A handle that drops every increment.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// A handle forwarding to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn StatsSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// True when a collector is attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Adds one to `counter`.
    #[inline]
    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Adds `by` to `counter`.
    #[inline]
    pub fn add(&self, counter: Counter, by: u64) {
        if let Some(sink) = &self.sink {
            sink.increment(counter, by);
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_handle_is_silent() {
        let telemetry = Telemetry::disabled();
        telemetry.incr(Counter::DrawCalls);
        assert!(!telemetry.is_enabled());
    }

    #[test]
    fn test_counts_reach_collector() {
        let stats = Arc::new(AtomicStats::new());
        let telemetry = Telemetry::new(stats.clone());
        let clone = telemetry.clone();

        telemetry.incr(Counter::DrawCalls);
        clone.add(Counter::DrawCalls, 4);
        clone.incr(Counter::VertexSpills);

        assert_eq!(stats.get(Counter::DrawCalls), 5);
        assert_eq!(stats.get(Counter::VertexSpills), 1);
        assert_eq!(stats.get(Counter::BufferReuses), 0);

        stats.reset();
        assert_eq!(stats.get(Counter::DrawCalls), 0);
    }

    #[test]
    fn test_counter_table_matches_discriminants() {
        for (i, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(*counter as usize, i);
        }
    }
}
