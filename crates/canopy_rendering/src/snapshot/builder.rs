//! Update-side snapshot walk.
//!
//! Nodes whose draw node is still valid are copied forward from the previous
//! build; only invalidated nodes go back to the tree for fresh cell values.

use std::collections::HashMap;

use canopy_core::{Counter, NodeId, SceneTree, Telemetry};
use tracing::trace;

use super::{DrawNode, FrameSnapshot};
use crate::error::RenderResult;

/// Counts from one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Generation written.
    pub generation: u64,
    /// Draw nodes written to the snapshot.
    pub written: usize,
    /// Nodes rebuilt from tree state.
    pub rebuilt: usize,
    /// Nodes copied from the previous build.
    pub copied: usize,
    /// Subtrees skipped as not present or fully clipped.
    pub culled: usize,
}

#[derive(Debug, Clone)]
struct CachedNode {
    draw: DrawNode,
    present: bool,
    stamp: u64,
}

#[derive(Debug)]
enum Visit {
    Enter(NodeId, u32),
    Exit(usize),
}

/// Walks the tree once per frame and fills a [`FrameSnapshot`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    cache: HashMap<NodeId, CachedNode>,
    stack: Vec<Visit>,
    stamp: u64,
    telemetry: Telemetry,
}

impl SnapshotBuilder {
    /// Creates a builder with an empty copy-forward cache.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            cache: HashMap::new(),
            stack: Vec::new(),
            stamp: 0,
            telemetry,
        }
    }

    /// Nodes currently held for copy-forward.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Writes the visible tree into `out`, stamping every node with
    /// `out.generation`.
    ///
    /// The caller resets `out` first (the ring writer does).
    ///
    /// # Errors
    ///
    /// Tree errors (wrong thread, cell failures) abort the build; `out` is
    /// then partial and must not be published.
    #[tracing::instrument(level = "trace", skip_all, fields(generation = out.generation))]
    pub fn build_into(&mut self, tree: &mut SceneTree, out: &mut FrameSnapshot) -> RenderResult<BuildStats> {
        self.stamp += 1;
        let generation = out.generation;
        let mut stats = BuildStats {
            generation,
            ..BuildStats::default()
        };

        self.stack.clear();
        self.stack.push(Visit::Enter(tree.root(), 0));

        while let Some(visit) = self.stack.pop() {
            match visit {
                Visit::Enter(id, depth) => {
                    let (mut draw, present) = self.resolve(tree, id, &mut stats)?;
                    if !present || draw.clip.is_some_and(|clip| clip.is_empty()) {
                        stats.culled += 1;
                        continue;
                    }
                    draw.generation = generation;
                    draw.depth = depth;
                    draw.subtree_len = 1;
                    let index = out.nodes.len();
                    out.nodes.push(draw);
                    self.stack.push(Visit::Exit(index));
                    for &child in tree.children(id)?.iter().rev() {
                        self.stack.push(Visit::Enter(child, depth + 1));
                    }
                }
                Visit::Exit(index) => {
                    let len = out.nodes.len() - index;
                    out.nodes[index].subtree_len = len as u32;
                }
            }
        }

        let stamp = self.stamp;
        self.cache.retain(|_, cached| cached.stamp == stamp);

        stats.written = out.nodes.len();
        self.telemetry.add(Counter::DrawNodesRebuilt, stats.rebuilt as u64);
        self.telemetry.add(Counter::DrawNodesCopied, stats.copied as u64);
        trace!(
            generation,
            written = stats.written,
            rebuilt = stats.rebuilt,
            copied = stats.copied,
            "snapshot built"
        );
        Ok(stats)
    }

    /// Builds a standalone snapshot for `generation`.
    ///
    /// # Errors
    ///
    /// See [`Self::build_into`].
    pub fn build(&mut self, tree: &mut SceneTree, generation: u64, frame_time_ms: f64) -> RenderResult<FrameSnapshot> {
        let mut out = FrameSnapshot::with_capacity(self.cache.len());
        out.reset(generation, frame_time_ms);
        self.build_into(tree, &mut out)?;
        Ok(out)
    }

    fn resolve(
        &mut self,
        tree: &mut SceneTree,
        id: NodeId,
        stats: &mut BuildStats,
    ) -> RenderResult<(DrawNode, bool)> {
        if tree.is_draw_node_valid(id)? {
            let invalidation_id = tree.invalidation_id(id)?;
            if let Some(cached) = self.cache.get_mut(&id) {
                if cached.draw.invalidation_id == invalidation_id {
                    cached.stamp = self.stamp;
                    stats.copied += 1;
                    return Ok((cached.draw.clone(), cached.present));
                }
            }
        }

        let state = tree.draw_state(id)?;
        let present = state.present;
        let draw = DrawNode::from_state(id, state);
        self.cache.insert(
            id,
            CachedNode {
                draw: draw.clone(),
                present,
                stamp: self.stamp,
            },
        );
        stats.rebuilt += 1;
        Ok((draw, present))
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(Telemetry::disabled())
    }
}
