//! Invalidation masks and sources.

use bitflags::bitflags;

bitflags! {
    /// Which cached aspects of a node are stale.
    ///
    /// An empty mask means nothing to do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Invalidation: u32 {
        /// Position, scale, rotation or origin in parent space.
        const TRANSFORM = 1 << 0;
        /// The resolved size of the node.
        const DRAW_SIZE = 1 << 1;
        /// Colour or alpha.
        const COLOUR = 1 << 2;
        /// Whether the node is drawn at all.
        const PRESENCE = 1 << 3;
        /// The space the node needs from an auto-sizing parent.
        const REQUIRED_PARENT_SIZE_TO_FIT = 1 << 4;
        /// Primitive payload or masking changed; only the draw node is stale.
        const DRAW_NODE = 1 << 5;
        /// The clip rectangle inherited from masking ancestors.
        const CLIP = 1 << 6;

        /// Everything that moves or resizes a node.
        const GEOMETRY = Self::TRANSFORM.bits()
            | Self::DRAW_SIZE.bits()
            | Self::REQUIRED_PARENT_SIZE_TO_FIT.bits();
        /// Geometry plus presence.
        const LAYOUT = Self::GEOMETRY.bits() | Self::PRESENCE.bits();
        /// Everything.
        const ALL = Self::LAYOUT.bits()
            | Self::COLOUR.bits()
            | Self::DRAW_NODE.bits()
            | Self::CLIP.bits();
    }
}

impl Invalidation {
    /// Bits that make a node's draw node stale.
    pub const DRAW_DEPENDENT: Self = Self::TRANSFORM
        .union(Self::DRAW_SIZE)
        .union(Self::COLOUR)
        .union(Self::PRESENCE)
        .union(Self::CLIP)
        .union(Self::DRAW_NODE);

    /// Bits forwarded to every child unchanged.
    pub const INHERITED: Self = Self::TRANSFORM
        .union(Self::COLOUR)
        .union(Self::PRESENCE)
        .union(Self::CLIP);

    /// Bits of a self change that alter what the parent must fit.
    pub const AFFECTS_PARENT_SIZE: Self = Self::DRAW_SIZE
        .union(Self::TRANSFORM)
        .union(Self::PRESENCE);
}

bitflags! {
    /// Where an invalidation event came from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InvalidationSource: u8 {
        /// The node itself changed.
        const SELF = 1 << 0;
        /// An ancestor changed.
        const PARENT = 1 << 1;
        /// A descendant changed.
        const CHILD = 1 << 2;
    }
}

impl Default for InvalidationSource {
    fn default() -> Self {
        Self::SELF | Self::PARENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_excludes_child() {
        let source = InvalidationSource::default();
        assert!(source.contains(InvalidationSource::SELF));
        assert!(source.contains(InvalidationSource::PARENT));
        assert!(!source.contains(InvalidationSource::CHILD));
    }

    #[test]
    fn test_aggregates() {
        assert!(Invalidation::LAYOUT.contains(Invalidation::PRESENCE));
        assert!(!Invalidation::GEOMETRY.contains(Invalidation::COLOUR));
        assert!(Invalidation::ALL.contains(Invalidation::DRAW_DEPENDENT));
        assert!(!Invalidation::INHERITED.contains(Invalidation::DRAW_SIZE));
        assert!(Invalidation::empty().is_empty());
    }
}
