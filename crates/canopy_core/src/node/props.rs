//! Property setters and cell reads.
//!
//! Setters compare with the current value and only invalidate on change.

use glam::{Affine2, Vec2};

use super::data::{Capabilities, Node, Primitive};
use super::id::NodeId;
use super::tree::SceneTree;
use crate::error::{CoreError, CoreResult};
use crate::geometry::{Axes, Rect, Rgba};
use crate::invalidation::{Invalidation, InvalidationSource};
use crate::layout::{CellHandle, CellKey, CellPredicate, CellUpdater, LayoutCell};

/// Custom cells per node. Freshness is tracked in a `u64`.
pub const MAX_CUSTOM_CELLS: usize = 64;

impl SceneTree {
    /// Applies `change` and invalidates whatever mask it reports with
    /// source Self. Returns whether anything changed.
    fn mutate(&mut self, id: NodeId, change: impl FnOnce(&mut Node) -> Invalidation) -> CoreResult<bool> {
        self.entry()?;
        self.checked(id)?;
        let mask = change(self.node_mut(id)?);
        if mask.is_empty() {
            return Ok(false);
        }
        self.invalidate_inner(id, mask, InvalidationSource::SELF);
        Ok(true)
    }

    /// Sets the position in parent space.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`], [`CoreError::WrongThread`]. Same for every setter.
    pub fn set_position(&mut self, id: NodeId, position: Vec2) -> CoreResult<bool> {
        self.mutate(id, |n| replace(&mut n.position, position, Invalidation::TRANSFORM))
    }

    /// Sets the explicit size.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_size(&mut self, id: NodeId, size: Vec2) -> CoreResult<bool> {
        self.mutate(id, |n| replace(&mut n.size, size, Invalidation::DRAW_SIZE))
    }

    /// Sets the scale.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_scale(&mut self, id: NodeId, scale: Vec2) -> CoreResult<bool> {
        self.mutate(id, |n| replace(&mut n.scale, scale, Invalidation::TRANSFORM))
    }

    /// Sets the rotation in radians.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_rotation(&mut self, id: NodeId, rotation: f32) -> CoreResult<bool> {
        self.mutate(id, |n| replace(&mut n.rotation, rotation, Invalidation::TRANSFORM))
    }

    /// Sets the pivot in local pixels.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_origin(&mut self, id: NodeId, origin: Vec2) -> CoreResult<bool> {
        self.mutate(id, |n| replace(&mut n.origin, origin, Invalidation::TRANSFORM))
    }

    /// Sets the colour.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_colour(&mut self, id: NodeId, colour: Rgba) -> CoreResult<bool> {
        self.mutate(id, |n| replace(&mut n.colour, colour, Invalidation::COLOUR))
    }

    /// Sets the alpha. Crossing zero also changes presence.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) -> CoreResult<bool> {
        self.mutate(id, |n| {
            let was_visible = n.alpha > 0.0;
            let mut mask = replace(&mut n.alpha, alpha, Invalidation::COLOUR);
            if was_visible != (alpha > 0.0) {
                mask |= Invalidation::PRESENCE;
            }
            mask
        })
    }

    /// Hides or shows the node.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> CoreResult<bool> {
        self.mutate(id, |n| replace(&mut n.hidden, hidden, Invalidation::PRESENCE))
    }

    /// Sets the axes sized as a fraction of the parent.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_relative_size_axes(&mut self, id: NodeId, axes: Axes) -> CoreResult<bool> {
        self.mutate(id, |n| {
            replace(
                &mut n.relative_size_axes,
                axes,
                Invalidation::DRAW_SIZE | Invalidation::TRANSFORM,
            )
        })
    }

    /// Sets the axes positioned as a fraction of the parent.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_relative_position_axes(&mut self, id: NodeId, axes: Axes) -> CoreResult<bool> {
        self.mutate(id, |n| {
            replace(
                &mut n.relative_position_axes,
                axes,
                Invalidation::DRAW_SIZE | Invalidation::TRANSFORM,
            )
        })
    }

    /// Sets the axes sized to fit the children.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_auto_size_axes(&mut self, id: NodeId, axes: Axes) -> CoreResult<bool> {
        self.mutate(id, |n| {
            replace(
                &mut n.auto_size_axes,
                axes,
                Invalidation::DRAW_SIZE | Invalidation::REQUIRED_PARENT_SIZE_TO_FIT,
            )
        })
    }

    /// Sets the axes an auto-sizing parent ignores this node on.
    ///
    /// An auto-sizing parent's children bound is invalidated directly: the
    /// cell predicate would judge the event by the new axes, not the old
    /// ones. Other parents only hear about it through child-sourced cells.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_bypass_auto_size_axes(&mut self, id: NodeId, axes: Axes) -> CoreResult<bool> {
        self.entry()?;
        self.checked(id)?;
        let node = self.node_mut(id)?;
        if node.bypass_auto_size_axes == axes {
            return Ok(false);
        }
        node.bypass_auto_size_axes = axes;
        let Some(parent) = node.parent else {
            return Ok(true);
        };
        if self.node(parent)?.auto_size_axes.is_empty() {
            self.invalidate_child_cells(parent, Invalidation::REQUIRED_PARENT_SIZE_TO_FIT, id);
        } else {
            self.invalidate_inner(
                parent,
                Invalidation::DRAW_SIZE | Invalidation::REQUIRED_PARENT_SIZE_TO_FIT,
                InvalidationSource::SELF,
            );
        }
        Ok(true)
    }

    /// Turns masking of children on or off.
    ///
    /// Children are told directly: whether their clip depended on this
    /// node's bounds flips, whatever state this node's own caches are in.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_masking(&mut self, id: NodeId, masking: bool) -> CoreResult<bool> {
        let changed = self.mutate(id, |n| {
            n.capabilities.set(Capabilities::REQUIRES_MASKING, masking);
            replace(&mut n.masking, masking, Invalidation::DRAW_NODE)
        })?;
        if changed {
            let count = self.node(id)?.children.len();
            for i in 0..count {
                let child = self.node(id)?.children[i];
                self.invalidate_inner(child, Invalidation::CLIP, InvalidationSource::PARENT);
            }
        }
        Ok(changed)
    }

    /// Replaces the draw payload.
    ///
    /// # Errors
    ///
    /// See [`Self::set_position`].
    pub fn set_primitive(&mut self, id: NodeId, primitive: Primitive) -> CoreResult<bool> {
        self.mutate(id, |n| {
            n.capabilities
                .set(Capabilities::EMITS_PRIMITIVE, primitive != Primitive::None);
            replace(&mut n.primitive, primitive, Invalidation::DRAW_NODE)
        })
    }

    /// Resolved size.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`], [`CoreError::WrongThread`],
    /// [`CoreError::CyclicLayout`]. Same for every cell read.
    pub fn draw_size(&mut self, id: NodeId) -> CoreResult<Vec2> {
        self.read(id, CellKey::DrawSize)
    }

    /// Children bound on auto-sizing axes.
    ///
    /// # Errors
    ///
    /// See [`Self::draw_size`].
    pub fn auto_size(&mut self, id: NodeId) -> CoreResult<Vec2> {
        self.read(id, CellKey::AutoSize)
    }

    /// World transform.
    ///
    /// # Errors
    ///
    /// See [`Self::draw_size`].
    pub fn draw_info(&mut self, id: NodeId) -> CoreResult<Affine2> {
        self.read(id, CellKey::DrawInfo)
    }

    /// Effective colour, alpha and ancestors applied.
    ///
    /// # Errors
    ///
    /// See [`Self::draw_size`].
    pub fn draw_colour(&mut self, id: NodeId) -> CoreResult<Rgba> {
        self.read(id, CellKey::DrawColour)
    }

    /// Present here and in every ancestor.
    ///
    /// # Errors
    ///
    /// See [`Self::draw_size`].
    pub fn is_present(&mut self, id: NodeId) -> CoreResult<bool> {
        self.read(id, CellKey::Presence)
    }

    /// Extent in parent space an auto-sizing parent must fit.
    ///
    /// # Errors
    ///
    /// See [`Self::draw_size`].
    pub fn required_parent_size_to_fit(&mut self, id: NodeId) -> CoreResult<Vec2> {
        self.read(id, CellKey::RequiredParentSizeToFit)
    }

    /// Clip applied when drawing this node, in world space.
    ///
    /// # Errors
    ///
    /// See [`Self::draw_size`].
    pub fn screen_space_clip(&mut self, id: NodeId) -> CoreResult<Option<Rect>> {
        self.read(id, CellKey::ScreenSpaceClip)
    }

    fn read<T: super::data::CellSlot>(&mut self, id: NodeId, key: CellKey) -> CoreResult<T> {
        self.entry()?;
        self.checked(id)?;
        self.pull(id, key)
    }

    /// Registers a custom cell with no updater. Reading it before
    /// [`Self::set_cell_updater`] fails with [`CoreError::NotComputable`].
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`], [`CoreError::WrongThread`],
    /// [`CoreError::UnknownCell`] past [`MAX_CUSTOM_CELLS`].
    pub fn register_cell(
        &mut self,
        id: NodeId,
        mask: Invalidation,
        sources: InvalidationSource,
    ) -> CoreResult<CellHandle> {
        self.entry()?;
        self.checked(id)?;
        let policy = self.policy;
        let custom = &mut self.node_mut(id)?.layout.custom;
        if custom.len() >= MAX_CUSTOM_CELLS {
            return Err(policy.report(CoreError::UnknownCell {
                node: id,
                index: custom.len(),
            }));
        }
        custom.push(LayoutCell::new(mask, sources));
        Ok(CellHandle(custom.len() - 1))
    }

    /// Wires the updater of a custom cell and drops its cached value.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownCell`] and the usual node errors.
    pub fn set_cell_updater(
        &mut self,
        id: NodeId,
        cell: CellHandle,
        updater: CellUpdater<f32>,
    ) -> CoreResult<()> {
        self.custom_cell(id, cell)?.set_updater(updater);
        Ok(())
    }

    /// Sets or clears the predicate of a custom cell.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownCell`] and the usual node errors.
    pub fn set_cell_predicate(
        &mut self,
        id: NodeId,
        cell: CellHandle,
        predicate: Option<CellPredicate>,
    ) -> CoreResult<()> {
        self.custom_cell(id, cell)?.set_predicate(predicate);
        Ok(())
    }

    /// Reads a custom cell, recomputing it if stale.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotComputable`] without an updater, plus the usual
    /// node errors.
    pub fn cell_value(&mut self, id: NodeId, cell: CellHandle) -> CoreResult<f32> {
        self.read(id, cell.key())
    }

    fn custom_cell(&mut self, id: NodeId, cell: CellHandle) -> CoreResult<&mut LayoutCell<f32>> {
        self.entry()?;
        self.checked(id)?;
        let policy = self.policy;
        self.node_mut(id)?
            .layout
            .custom
            .get_mut(cell.0)
            .ok_or_else(|| policy.report(CoreError::UnknownCell { node: id, index: cell.0 }))
    }

    /// Whether a cell currently holds a valid value.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`], [`CoreError::UnknownCell`].
    pub fn is_cell_valid(&self, id: NodeId, key: CellKey) -> CoreResult<bool> {
        let node = self.node(id)?;
        node.layout.is_valid(key).ok_or(CoreError::UnknownCell {
            node: id,
            index: match key {
                CellKey::Custom(index) => index,
                _ => 0,
            },
        })
    }

    /// Whether the node's draw node is current.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`].
    pub fn is_draw_node_valid(&self, id: NodeId) -> CoreResult<bool> {
        Ok(self.node(id)?.draw_node_valid)
    }

    /// Counter bumped each time the draw node goes stale.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`].
    pub fn invalidation_id(&self, id: NodeId) -> CoreResult<u64> {
        Ok(self.node(id)?.invalidation_id)
    }

    /// Bits received from children that no revalidation has consumed yet.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`].
    pub fn pending_child_invalidation(&self, id: NodeId) -> CoreResult<Invalidation> {
        Ok(self.node(id)?.child_invalidation)
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T, mask: Invalidation) -> Invalidation {
    if *slot == value {
        Invalidation::empty()
    } else {
        *slot = value;
        mask
    }
}
