//! Lazily revalidated layout cells.
//!
//! A cell caches one computed value and the [`Invalidation`] bits it
//! depends on. Propagation marks it stale; the next read recomputes it
//! through an owner-supplied updater.
//!
//! [`Invalidation`]: crate::invalidation::Invalidation

mod cell;

pub use cell::{CellContext, CellPredicate, CellUpdater, LayoutCell};

/// Names a cell on a node, for errors and validity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKey {
    /// Resolved size.
    DrawSize,
    /// Bound of present children, for auto-sizing axes.
    AutoSize,
    /// World transform.
    DrawInfo,
    /// Effective colour.
    DrawColour,
    /// Effective presence.
    Presence,
    /// Space needed from an auto-sizing parent.
    RequiredParentSizeToFit,
    /// Clip inherited from masking ancestors.
    ScreenSpaceClip,
    /// A cell registered with [`crate::SceneTree::register_cell`].
    Custom(usize),
}

impl CellKey {
    /// Built-in cells in storage order.
    pub const BUILTIN: [CellKey; 7] = [
        CellKey::DrawSize,
        CellKey::AutoSize,
        CellKey::DrawInfo,
        CellKey::DrawColour,
        CellKey::Presence,
        CellKey::RequiredParentSizeToFit,
        CellKey::ScreenSpaceClip,
    ];
}

/// Handle to a custom cell on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellHandle(pub(crate) usize);

impl CellHandle {
    /// Key used in errors and validity queries.
    #[must_use]
    pub fn key(self) -> CellKey {
        CellKey::Custom(self.0)
    }
}
