//! Per-node draw payload.

use canopy_core::{NodeDrawState, NodeId, Primitive, Rect, Rgba};
use glam::{Affine2, Vec2};

/// Immutable copy of one node's render-relevant state for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawNode {
    /// Source node.
    pub node: NodeId,
    /// Generation of the snapshot holding this node.
    pub generation: u64,
    /// Tree-side invalidation id the payload was built from.
    pub invalidation_id: u64,
    /// World transform.
    pub transform: Affine2,
    /// Draw size in local space.
    pub size: Vec2,
    /// Effective colour, alpha included.
    pub colour: Rgba,
    /// Clip in world space, if any ancestor masks.
    pub clip: Option<Rect>,
    /// Draw payload.
    pub primitive: Primitive,
    /// Depth below the snapshot root.
    pub depth: u32,
    /// Nodes in this subtree, self included. Children follow contiguously.
    pub subtree_len: u32,
}

impl DrawNode {
    pub(crate) fn from_state(node: NodeId, state: NodeDrawState) -> Self {
        Self {
            node,
            generation: 0,
            invalidation_id: state.invalidation_id,
            transform: state.transform,
            size: state.size,
            colour: state.colour,
            clip: state.clip,
            primitive: state.primitive,
            depth: 0,
            subtree_len: 1,
        }
    }

    /// World-space bounds of the node's draw rectangle.
    #[must_use]
    pub fn world_bounds(&self) -> Rect {
        Rect::from_size(self.size).transformed_bounds(&self.transform)
    }

    /// True when the node has nothing to emit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.primitive, Primitive::None) || self.colour.a <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_bounds_follow_transform() {
        let node = DrawNode {
            node: NodeId::new(1, 0),
            generation: 1,
            invalidation_id: 0,
            transform: Affine2::from_translation(Vec2::new(5.0, 5.0)),
            size: Vec2::new(10.0, 4.0),
            colour: Rgba::WHITE,
            clip: None,
            primitive: Primitive::solid_quad(),
            depth: 0,
            subtree_len: 1,
        };
        assert_eq!(node.world_bounds(), Rect::new(5.0, 5.0, 10.0, 4.0));
        assert!(!node.is_empty());
    }
}
