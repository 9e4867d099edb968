//! One generation of the draw tree.

use super::DrawNode;

/// A flattened depth-first copy of the visible tree for one generation.
///
/// Produced by [`super::SnapshotBuilder`] and consumed by the draw pass.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    /// Generation this snapshot was written for. Zero means never published
    /// or abandoned mid-write.
    pub generation: u64,
    /// Clock time the update tick ran at, in milliseconds.
    pub frame_time_ms: f64,
    /// Visible nodes in depth-first order.
    pub nodes: Vec<DrawNode>,
}

impl FrameSnapshot {
    /// Empty snapshot with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generation: 0,
            frame_time_ms: 0.0,
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Resets for a new generation, keeping the allocation.
    pub fn reset(&mut self, generation: u64, frame_time_ms: f64) {
        self.generation = generation;
        self.frame_time_ms = frame_time_ms;
        self.nodes.clear();
    }

    /// Number of draw nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node carries the snapshot's generation, depths step by one and
    /// every subtree range nests inside its parent's. Linear in node count.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        if self.generation == 0 {
            return false;
        }
        let len = self.nodes.len();
        let mut open: Vec<usize> = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            while open.last().is_some_and(|&end| end <= i) {
                open.pop();
            }
            let end = i + node.subtree_len as usize;
            let nested = open.last().map_or(true, |&parent_end| end <= parent_end);
            if node.generation != self.generation
                || node.subtree_len == 0
                || end > len
                || !nested
                || node.depth as usize != open.len()
            {
                return false;
            }
            open.push(end);
        }
        true
    }

    /// Direct children of the node at `index`, as indices.
    pub fn children_of(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let (end, depth) = self
            .nodes
            .get(index)
            .map_or((index, 0), |n| (index + n.subtree_len as usize, n.depth));
        let mut next = index + 1;
        std::iter::from_fn(move || {
            if next >= end {
                return None;
            }
            let current = next;
            let node = &self.nodes[current];
            debug_assert_eq!(node.depth, depth + 1);
            next += node.subtree_len as usize;
            Some(current)
        })
    }
}
