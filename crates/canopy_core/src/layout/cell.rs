//! Pull-based cached values that invalidation bits knock out.

use crate::error::CoreResult;
use crate::invalidation::{Invalidation, InvalidationSource};
use crate::node::{Node, NodeId, SceneTree};

/// Recomputes a cell from the tree. May pull other cells.
pub type CellUpdater<T> = fn(&mut SceneTree, NodeId) -> CoreResult<T>;

/// Refines whether an event that matches a cell's mask applies to it.
pub type CellPredicate = fn(&CellContext<'_>) -> bool;

/// The event a predicate is asked about.
#[derive(Debug, Clone, Copy)]
pub struct CellContext<'a> {
    /// Node owning the cell.
    pub owner: &'a Node,
    /// For child-sourced events, the child the change came from.
    pub origin: Option<&'a Node>,
    /// Incoming bits.
    pub mask: Invalidation,
    /// Incoming direction.
    pub source: InvalidationSource,
}

/// A cached value bound to a subset of invalidation bits.
///
/// Starts invalid. Lives and dies with its owning node.
#[derive(Debug, Clone)]
pub struct LayoutCell<T> {
    value: T,
    valid: bool,
    computing: bool,
    mask: Invalidation,
    sources: InvalidationSource,
    notify_parent: Invalidation,
    predicate: Option<CellPredicate>,
    updater: Option<CellUpdater<T>>,
}

impl<T: Copy + Default> LayoutCell<T> {
    /// An invalid cell reacting to `mask` from `sources`.
    #[must_use]
    pub fn new(mask: Invalidation, sources: InvalidationSource) -> Self {
        Self {
            value: T::default(),
            valid: false,
            computing: false,
            mask,
            sources,
            notify_parent: Invalidation::empty(),
            predicate: None,
            updater: None,
        }
    }

    /// Sets the updater.
    #[must_use]
    pub fn with_updater(mut self, updater: CellUpdater<T>) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: CellPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// On revalidation, clears `bits` from the parent's pending child changes.
    #[must_use]
    pub fn notifying_parent(mut self, bits: Invalidation) -> Self {
        self.notify_parent = bits;
        self
    }

    /// True when the cached value is current.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The cached value, if current.
    #[inline]
    #[must_use]
    pub fn cached(&self) -> Option<T> {
        self.valid.then_some(self.value)
    }

    /// Dependency mask.
    #[must_use]
    pub fn mask(&self) -> Invalidation {
        self.mask
    }

    /// Sources the cell reacts to.
    #[must_use]
    pub fn sources(&self) -> InvalidationSource {
        self.sources
    }

    /// Bits cleared on the parent when this cell revalidates.
    #[must_use]
    pub fn parent_notification(&self) -> Invalidation {
        self.notify_parent
    }

    /// The updater, if wired.
    #[must_use]
    pub fn updater(&self) -> Option<CellUpdater<T>> {
        self.updater
    }

    /// Replaces the updater and drops the cached value.
    pub fn set_updater(&mut self, updater: CellUpdater<T>) {
        self.updater = Some(updater);
        self.valid = false;
    }

    /// Replaces the predicate.
    pub fn set_predicate(&mut self, predicate: Option<CellPredicate>) {
        self.predicate = predicate;
    }

    /// True when an event described by `ctx` applies to this cell.
    ///
    /// Does not look at validity; see [`Self::invalidate`].
    #[must_use]
    pub fn accepts(&self, ctx: &CellContext<'_>) -> bool {
        self.mask.intersects(ctx.mask)
            && self.sources.intersects(ctx.source)
            && self.predicate.map_or(true, |accept| accept(ctx))
    }

    /// Marks the cell stale. Returns true only on a valid-to-invalid transition.
    #[inline]
    pub fn invalidate(&mut self) -> bool {
        std::mem::replace(&mut self.valid, false)
    }

    /// Stores a freshly computed value.
    pub fn validate(&mut self, value: T) {
        self.value = value;
        self.valid = true;
    }

    pub(crate) fn begin_compute(&mut self) -> bool {
        !std::mem::replace(&mut self.computing, true)
    }

    pub(crate) fn end_compute(&mut self) {
        self.computing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Capabilities;

    fn ctx<'a>(owner: &'a Node, mask: Invalidation, source: InvalidationSource) -> CellContext<'a> {
        CellContext {
            owner,
            origin: None,
            mask,
            source,
        }
    }

    #[test]
    fn test_starts_invalid() {
        let cell: LayoutCell<f32> =
            LayoutCell::new(Invalidation::DRAW_SIZE, InvalidationSource::default());
        assert!(!cell.is_valid());
        assert_eq!(cell.cached(), None);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let mut cell: LayoutCell<f32> =
            LayoutCell::new(Invalidation::DRAW_SIZE, InvalidationSource::default());
        cell.validate(3.0);
        assert_eq!(cell.cached(), Some(3.0));
        assert!(cell.invalidate());
        assert!(!cell.invalidate());
        assert!(!cell.invalidate());
    }

    #[test]
    fn test_accepts_checks_mask_and_source() {
        let owner = Node::new(Capabilities::HAS_CHILDREN);
        let cell: LayoutCell<f32> =
            LayoutCell::new(Invalidation::DRAW_SIZE, InvalidationSource::CHILD);

        assert!(cell.accepts(&ctx(&owner, Invalidation::DRAW_SIZE, InvalidationSource::CHILD)));
        assert!(!cell.accepts(&ctx(&owner, Invalidation::DRAW_SIZE, InvalidationSource::SELF)));
        assert!(!cell.accepts(&ctx(&owner, Invalidation::COLOUR, InvalidationSource::CHILD)));
    }

    #[test]
    fn test_predicate_refines() {
        fn only_containers(ctx: &CellContext<'_>) -> bool {
            ctx.owner.capabilities().contains(Capabilities::HAS_CHILDREN)
        }
        let cell: LayoutCell<f32> =
            LayoutCell::new(Invalidation::COLOUR, InvalidationSource::default())
                .with_predicate(only_containers);

        let container = Node::new(Capabilities::HAS_CHILDREN);
        let leaf = Node::new(Capabilities::EMITS_PRIMITIVE);
        assert!(cell.accepts(&ctx(&container, Invalidation::COLOUR, InvalidationSource::SELF)));
        assert!(!cell.accepts(&ctx(&leaf, Invalidation::COLOUR, InvalidationSource::SELF)));
    }

    #[test]
    fn test_compute_guard() {
        let mut cell: LayoutCell<f32> =
            LayoutCell::new(Invalidation::DRAW_SIZE, InvalidationSource::default());
        assert!(cell.begin_compute());
        assert!(!cell.begin_compute());
        cell.end_compute();
        assert!(cell.begin_compute());
    }
}
