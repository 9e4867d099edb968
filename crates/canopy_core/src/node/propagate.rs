//! Invalidation propagation.
//!
//! ```text
//!            parent   ← REQUIRED_PARENT_SIZE_TO_FIT, own bits to custom cells (source: Child)
//!              ↑
//!   setter → node     (source: Self)
//!              ↓
//!          children   ← inherited bits (source: Parent)
//! ```
//!
//! A walk stops at the first node where nothing was freshly invalidated,
//! so cost is bounded by the part of the tree that was valid before.

use super::data::Node;
use super::id::NodeId;
use super::tree::SceneTree;
use crate::error::CoreResult;
use crate::invalidation::{Invalidation, InvalidationSource};
use crate::layout::{CellContext, CellKey};
use crate::telemetry::Counter;

/// Which of a node's caches went from valid to invalid in one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FreshCells {
    builtin: u8,
    custom: u64,
    draw_node: bool,
}

impl FreshCells {
    pub fn any(self) -> bool {
        self.builtin != 0 || self.custom != 0 || self.draw_node
    }

    pub fn contains(self, key: CellKey) -> bool {
        match key {
            CellKey::Custom(i) => i < 64 && self.custom & (1 << i) != 0,
            builtin => CellKey::BUILTIN
                .iter()
                .position(|k| *k == builtin)
                .is_some_and(|i| self.builtin & (1 << i) != 0),
        }
    }
}

impl SceneTree {
    /// Invalidates `mask` on `id` as if it came from `source`, propagating
    /// up and down. Returns true if anything on `id` went from valid to
    /// invalid; false means the call was a no-op and nothing was walked.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::StaleNode`], [`crate::CoreError::WrongThread`].
    pub fn invalidate(
        &mut self,
        id: NodeId,
        mask: Invalidation,
        source: InvalidationSource,
    ) -> CoreResult<bool> {
        self.entry()?;
        self.checked(id)?;
        Ok(self.invalidate_inner(id, mask, source))
    }

    pub(crate) fn invalidate_inner(
        &mut self,
        id: NodeId,
        mask: Invalidation,
        source: InvalidationSource,
    ) -> bool {
        if mask.is_empty() {
            return false;
        }
        self.telemetry.incr(Counter::Invalidations);

        let fresh = self.invalidate_local(id, mask, source, None);
        if source.contains(InvalidationSource::SELF) {
            if let Some(parent) = self.node(id).ok().and_then(Node::parent) {
                self.invalidate_child_cells(parent, mask, id);
            }
        }
        if !fresh.any() {
            return false;
        }

        if source.contains(InvalidationSource::SELF)
            && mask.intersects(Invalidation::AFFECTS_PARENT_SIZE)
        {
            if let Some(parent) = self.node(id).ok().and_then(Node::parent) {
                self.invalidate_from_child(
                    parent,
                    Invalidation::REQUIRED_PARENT_SIZE_TO_FIT,
                    id,
                );
            }
        }

        if source.intersects(InvalidationSource::SELF | InvalidationSource::PARENT) {
            self.propagate_down(id, mask);
        }
        true
    }

    /// A child reported `mask`. Applies child-sourced cells; a fresh
    /// auto-size turns into a size change of this node.
    pub(crate) fn invalidate_from_child(&mut self, id: NodeId, mask: Invalidation, child: NodeId) {
        self.telemetry.incr(Counter::Invalidations);
        match self.node_mut(id) {
            Ok(node) => node.child_invalidation |= mask,
            Err(_) => return,
        }

        let fresh = self.invalidate_local(id, mask, InvalidationSource::CHILD, Some(child));
        if fresh.contains(CellKey::AutoSize) {
            self.invalidate_inner(id, Invalidation::DRAW_SIZE, InvalidationSource::SELF);
        }
    }

    /// Custom cells of `id` sourced from children see the child's own bits,
    /// whether or not they map onto a built-in change of `id`. Stays local:
    /// custom cells never feed the walk.
    pub(crate) fn invalidate_child_cells(&mut self, id: NodeId, mask: Invalidation, child: NodeId) {
        let accepting = {
            let Ok(owner) = self.node(id) else { return };
            if owner.layout.custom.is_empty() {
                return;
            }
            let ctx = CellContext {
                owner,
                origin: self.node(child).ok(),
                mask,
                source: InvalidationSource::CHILD,
            };
            owner.layout.accepting_custom(&ctx)
        };
        if accepting != 0 {
            if let Ok(node) = self.node_mut(id) {
                node.layout.invalidate_custom(accepting);
            }
        }
    }

    fn propagate_down(&mut self, id: NodeId, mask: Invalidation) {
        let Ok(node) = self.node(id) else { return };
        let count = node.children.len();
        for i in 0..count {
            let Ok(node) = self.node(id) else { return };
            let masking = node.masking;
            let child = node.children[i];
            let Ok(child_node) = self.node(child) else { continue };
            let child_mask = downward_mask(mask, child_node, masking);
            self.invalidate_inner(child, child_mask, InvalidationSource::PARENT);
        }
    }

    /// Invalidates matching cells and the draw node of one node, no walking.
    fn invalidate_local(
        &mut self,
        id: NodeId,
        mask: Invalidation,
        source: InvalidationSource,
        origin: Option<NodeId>,
    ) -> FreshCells {
        let (builtin, custom) = {
            let Ok(owner) = self.node(id) else {
                return FreshCells::default();
            };
            let ctx = CellContext {
                owner,
                origin: origin.and_then(|o| self.node(o).ok()),
                mask,
                source,
            };
            (
                owner.layout.accepting_builtins(&ctx),
                owner.layout.accepting_custom(&ctx),
            )
        };

        let Ok(node) = self.node_mut(id) else {
            return FreshCells::default();
        };
        let mut fresh = FreshCells {
            builtin: node.layout.invalidate_builtins(builtin),
            custom: node.layout.invalidate_custom(custom),
            draw_node: false,
        };

        if source.intersects(InvalidationSource::SELF | InvalidationSource::PARENT)
            && mask.intersects(Invalidation::DRAW_DEPENDENT)
            && node.draw_node_valid
        {
            node.draw_node_valid = false;
            node.invalidation_id += 1;
            fresh.draw_node = true;
        }
        fresh
    }

    /// A cell that notifies its parent was revalidated: clear the matching
    /// pending bits up the chain for as long as they are set.
    pub(crate) fn validate_super_tree(&mut self, id: NodeId, bits: Invalidation) {
        let mut current = id;
        while let Some(parent) = self.node(current).ok().and_then(Node::parent) {
            let Ok(node) = self.node_mut(parent) else { return };
            if !node.child_invalidation.intersects(bits) {
                return;
            }
            node.child_invalidation.remove(bits);
            current = parent;
        }
    }
}

/// What a child receives when its parent is invalidated with `mask`.
fn downward_mask(mask: Invalidation, child: &Node, parent_masks: bool) -> Invalidation {
    let mut forwarded = mask & Invalidation::INHERITED;
    if mask.contains(Invalidation::DRAW_SIZE) {
        if !child.relative_size_axes.is_empty() {
            forwarded |= Invalidation::DRAW_SIZE;
        }
        if !child.relative_position_axes.is_empty() {
            forwarded |= Invalidation::TRANSFORM;
        }
        if parent_masks {
            forwarded |= Invalidation::CLIP;
        }
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Axes;
    use crate::node::Capabilities;

    #[test]
    fn test_downward_mask_rules() {
        let plain = Node::new(Capabilities::empty());
        let mut relative = Node::new(Capabilities::empty());
        relative.relative_size_axes = Axes::X;
        let mut anchored = Node::new(Capabilities::empty());
        anchored.relative_position_axes = Axes::Y;

        assert_eq!(
            downward_mask(Invalidation::DRAW_SIZE, &plain, false),
            Invalidation::empty()
        );
        assert_eq!(
            downward_mask(Invalidation::DRAW_SIZE, &relative, false),
            Invalidation::DRAW_SIZE
        );
        assert_eq!(
            downward_mask(Invalidation::DRAW_SIZE, &anchored, true),
            Invalidation::TRANSFORM | Invalidation::CLIP
        );
        assert_eq!(
            downward_mask(Invalidation::COLOUR | Invalidation::DRAW_NODE, &plain, false),
            Invalidation::COLOUR
        );
        assert_eq!(
            downward_mask(Invalidation::REQUIRED_PARENT_SIZE_TO_FIT, &plain, true),
            Invalidation::empty()
        );
    }

    #[test]
    fn test_fresh_cells_lookup() {
        let fresh = FreshCells {
            builtin: 0b10,
            custom: 0b100,
            draw_node: false,
        };
        assert!(fresh.any());
        assert!(fresh.contains(CellKey::AutoSize));
        assert!(!fresh.contains(CellKey::DrawSize));
        assert!(fresh.contains(CellKey::Custom(2)));
        assert!(!fresh.contains(CellKey::Custom(70)));
        assert!(!FreshCells::default().any());
    }
}
