//! # Core Error Types
//!
//! Structural misuse of the tree and configuration failures.

use thiserror::Error;

use crate::layout::CellKey;
use crate::node::NodeId;
use crate::thread::ThreadRole;

/// Errors raised by scene-graph operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The child is already attached somewhere else.
    #[error("node {child} is already attached to {parent}")]
    AlreadyAttached {
        /// The node being attached.
        child: NodeId,
        /// Its current parent.
        parent: NodeId,
    },

    /// Attaching would make a node its own ancestor.
    #[error("attaching {child} under {parent} would create a cycle")]
    WouldCreateCycle {
        /// Requested parent.
        parent: NodeId,
        /// Requested child.
        child: NodeId,
    },

    /// The parent cannot hold children.
    #[error("node {0} cannot hold children")]
    NotAContainer(NodeId),

    /// The handle refers to a removed node or a reused slot.
    #[error("stale node handle {0}")]
    StaleNode(NodeId),

    /// The root container cannot be detached or removed.
    #[error("the root node cannot be detached or removed")]
    RootImmutable,

    /// A cell was read but has no updater wired.
    #[error("cell {cell:?} on node {node} has no updater")]
    NotComputable {
        /// Owner of the cell.
        node: NodeId,
        /// Which cell.
        cell: CellKey,
    },

    /// A cell updater ended up reading its own cell.
    #[error("cell {cell:?} on node {node} depends on itself")]
    CyclicLayout {
        /// Owner of the cell.
        node: NodeId,
        /// Which cell.
        cell: CellKey,
    },

    /// A custom cell handle does not exist on this node.
    #[error("node {node} has no custom cell {index}")]
    UnknownCell {
        /// Owner node.
        node: NodeId,
        /// Custom cell index.
        index: usize,
    },

    /// Child index out of range for an insert.
    #[error("child index {index} out of range (len {len})")]
    ChildIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Current child count.
        len: usize,
    },

    /// The tree was touched from a thread that does not own it.
    #[error("tree accessed from {actual:?} thread, owned by {expected:?}")]
    WrongThread {
        /// Role the tree is bound to.
        expected: ThreadRole,
        /// Role of the calling thread, if known.
        actual: ThreadRole,
    },
}

/// Result type for scene-graph operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading or validating a [`crate::PipelineConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML text did not parse.
    #[error("failed to parse pipeline config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config file could not be read.
    #[error("failed to read pipeline config: {0}")]
    Io(#[from] std::io::Error),

    /// A field is outside its allowed range.
    #[error("invalid pipeline config: {field} {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::ChildIndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "child index 4 out of range (len 2)");

        let err = ConfigError::Invalid {
            field: "ring_depth",
            reason: "must be at least 2",
        };
        assert_eq!(
            err.to_string(),
            "invalid pipeline config: ring_depth must be at least 2"
        );
    }
}
