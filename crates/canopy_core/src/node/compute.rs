//! Cell updaters and the pull path.
//!
//! Every updater reads other cells through [`SceneTree::pull`], so a read
//! always revalidates its dependencies first.

use glam::{Affine2, Vec2};

use super::data::{CellSlot, Primitive};
use super::id::NodeId;
use super::tree::SceneTree;
use crate::error::{CoreError, CoreResult};
use crate::geometry::{Rect, Rgba};
use crate::invalidation::InvalidationSource;
use crate::layout::{CellContext, CellKey};
use crate::telemetry::Counter;

/// Everything the snapshot builder needs from one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDrawState {
    /// World transform.
    pub transform: Affine2,
    /// Resolved size.
    pub size: Vec2,
    /// Effective colour.
    pub colour: Rgba,
    /// Inherited clip in world space.
    pub clip: Option<Rect>,
    /// Effective presence.
    pub present: bool,
    /// Draw payload.
    pub primitive: Primitive,
    /// Bumped whenever the draw node goes stale.
    pub invalidation_id: u64,
}

impl SceneTree {
    /// Reads a cell, recomputing it if stale.
    pub(crate) fn pull<T: CellSlot>(&mut self, id: NodeId, key: CellKey) -> CoreResult<T> {
        let policy = self.policy;
        let node = self.node_mut(id)?;
        let Some(cell) = T::slot(&mut node.layout, key) else {
            let CellKey::Custom(index) = key else {
                return Err(CoreError::NotComputable { node: id, cell: key });
            };
            return Err(policy.report(CoreError::UnknownCell { node: id, index }));
        };
        if let Some(value) = cell.cached() {
            return Ok(value);
        }
        let Some(updater) = cell.updater() else {
            return Err(policy.report(CoreError::NotComputable { node: id, cell: key }));
        };
        if !cell.begin_compute() {
            return Err(policy.report(CoreError::CyclicLayout { node: id, cell: key }));
        }

        let result = updater(self, id);

        let node = self.node_mut(id)?;
        let Some(cell) = T::slot(&mut node.layout, key) else {
            return Err(CoreError::NotComputable { node: id, cell: key });
        };
        cell.end_compute();
        let value = result?;
        cell.validate(value);
        let notify = cell.parent_notification();
        if cell.sources().contains(InvalidationSource::CHILD) {
            let handled = cell.mask();
            node.child_invalidation.remove(handled);
        }

        self.telemetry.incr(Counter::CacheRevalidations);
        if !notify.is_empty() {
            self.validate_super_tree(id, notify);
        }
        Ok(value)
    }

    /// Pulls every cell the draw node needs and marks the draw node valid.
    ///
    /// # Errors
    ///
    /// Propagates cell errors; see [`SceneTree::draw_size`].
    pub fn draw_state(&mut self, id: NodeId) -> CoreResult<NodeDrawState> {
        self.entry()?;
        self.checked(id)?;
        let present = self.pull::<bool>(id, CellKey::Presence)?;
        let transform = self.pull::<Affine2>(id, CellKey::DrawInfo)?;
        let size = self.pull::<Vec2>(id, CellKey::DrawSize)?;
        let colour = self.pull::<Rgba>(id, CellKey::DrawColour)?;
        let clip = self.pull::<Option<Rect>>(id, CellKey::ScreenSpaceClip)?;

        let node = self.node_mut(id)?;
        node.draw_node_valid = true;
        Ok(NodeDrawState {
            transform,
            size,
            colour,
            clip,
            present,
            primitive: node.primitive.clone(),
            invalidation_id: node.invalidation_id,
        })
    }
}

fn parent_draw_size(tree: &mut SceneTree, parent: Option<NodeId>) -> CoreResult<Vec2> {
    match parent {
        Some(parent) => tree.pull(parent, CellKey::DrawSize),
        None => Ok(Vec2::ZERO),
    }
}

/// Size ignoring relative axes: explicit, or the children bound on
/// auto-sizing axes. Relative axes read as zero.
fn intrinsic_size(tree: &mut SceneTree, id: NodeId) -> CoreResult<Vec2> {
    let node = tree.node(id)?;
    let relative = node.relative_size_axes;
    let auto = node.auto_size_axes.difference(relative);
    let mut size = node.size;
    if !auto.is_empty() {
        let bound: Vec2 = tree.pull(id, CellKey::AutoSize)?;
        size = auto.select(bound, size);
    }
    Ok(relative.select(Vec2::ZERO, size))
}

fn resolved_position(tree: &mut SceneTree, node_id: NodeId) -> CoreResult<Vec2> {
    let node = tree.node(node_id)?;
    let (position, relative, parent) = (node.position, node.relative_position_axes, node.parent);
    if relative.is_empty() {
        return Ok(position);
    }
    let parent_size = parent_draw_size(tree, parent)?;
    Ok(relative.select(position * parent_size, position))
}

pub(super) fn draw_size(tree: &mut SceneTree, id: NodeId) -> CoreResult<Vec2> {
    let intrinsic = intrinsic_size(tree, id)?;
    let node = tree.node(id)?;
    let (size, relative, parent) = (node.size, node.relative_size_axes, node.parent);
    if relative.is_empty() {
        return Ok(intrinsic);
    }
    let parent_size = parent_draw_size(tree, parent)?;
    Ok(relative.select(size * parent_size, intrinsic))
}

/// Child-sourced events matter only if this node auto-sizes on an axis
/// the child does not bypass.
pub(super) fn auto_size_applies(ctx: &CellContext<'_>) -> bool {
    if ctx.source != InvalidationSource::CHILD {
        return true;
    }
    let axes = ctx.owner.auto_size_axes;
    if axes.is_empty() {
        return false;
    }
    ctx.origin
        .map_or(true, |child| !child.bypass_auto_size_axes.contains(axes))
}

/// Max over children of what they need, per auto-sizing axis. Hidden
/// children are pulled too, so they report when they reappear.
pub(super) fn auto_size(tree: &mut SceneTree, id: NodeId) -> CoreResult<Vec2> {
    let axes = tree.node(id)?.auto_size_axes;
    let count = tree.node(id)?.children.len();
    let mut bound = Vec2::ZERO;
    for i in 0..count {
        let child = tree.node(id)?.children[i];
        let (counted, present) = {
            let node = tree.node(child)?;
            (axes.difference(node.bypass_auto_size_axes), node.is_locally_present())
        };
        if counted.is_empty() {
            continue;
        }
        let required: Vec2 = tree.pull(child, CellKey::RequiredParentSizeToFit)?;
        if present {
            bound = counted.select(bound.max(required), bound);
        }
    }
    Ok(bound)
}

/// Bottom-right extent of the node in parent space. Relative axes count
/// as zero so an auto-sizing parent never depends on its own size.
pub(super) fn required_parent_size_to_fit(tree: &mut SceneTree, id: NodeId) -> CoreResult<Vec2> {
    let size = intrinsic_size(tree, id)?;
    let node = tree.node(id)?;
    let position = node.relative_position_axes.select(Vec2::ZERO, node.position);
    let bounds = Rect::from_size(size).transformed_bounds(&node.local_transform(position));
    let extent = bounds.max().max(Vec2::ZERO);
    Ok(node.relative_size_axes.select(Vec2::ZERO, extent))
}

pub(super) fn draw_info(tree: &mut SceneTree, id: NodeId) -> CoreResult<Affine2> {
    let position = resolved_position(tree, id)?;
    let node = tree.node(id)?;
    let local = node.local_transform(position);
    let parent = node.parent;
    let parent_transform = match parent {
        Some(parent) => tree.pull(parent, CellKey::DrawInfo)?,
        None => Affine2::IDENTITY,
    };
    Ok(parent_transform * local)
}

pub(super) fn draw_colour(tree: &mut SceneTree, id: NodeId) -> CoreResult<Rgba> {
    let node = tree.node(id)?;
    let own = node.colour.with_alpha(node.colour.a * node.alpha);
    let parent = node.parent;
    match parent {
        Some(parent) => Ok(tree.pull::<Rgba>(parent, CellKey::DrawColour)?.multiply(own)),
        None => Ok(own),
    }
}

pub(super) fn presence(tree: &mut SceneTree, id: NodeId) -> CoreResult<bool> {
    let node = tree.node(id)?;
    if !node.is_locally_present() {
        return Ok(false);
    }
    let parent = node.parent;
    match parent {
        Some(parent) => tree.pull(parent, CellKey::Presence),
        None => Ok(true),
    }
}

/// The clip the node draws under: its parent's clip, narrowed to the
/// parent's world bounds when the parent masks.
pub(super) fn screen_space_clip(tree: &mut SceneTree, id: NodeId) -> CoreResult<Option<Rect>> {
    let Some(parent) = tree.node(id)?.parent else {
        return Ok(None);
    };
    let inherited: Option<Rect> = tree.pull(parent, CellKey::ScreenSpaceClip)?;
    if !tree.node(parent)?.masking {
        return Ok(inherited);
    }
    let size: Vec2 = tree.pull(parent, CellKey::DrawSize)?;
    let transform: Affine2 = tree.pull(parent, CellKey::DrawInfo)?;
    let bounds = Rect::from_size(size).transformed_bounds(&transform);
    Ok(Some(inherited.map_or(bounds, |clip| clip.intersection(&bounds))))
}
