//! # Render Error Types

use canopy_core::CoreError;
use thiserror::Error;

/// Errors raised by the snapshot ring, the batcher and render devices.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The slot for `generation` is still held by a reader after the bounded
    /// wait. Nothing was written; retry later.
    #[error("backpressure: slot {slot} still in use, generation {generation} not started")]
    Backpressure {
        /// Generation that could not be started.
        generation: u64,
        /// Ring slot that is still held.
        slot: usize,
    },

    /// A second writer tried to start while one is open.
    #[error("a snapshot write is already in progress")]
    WriterBusy,

    /// A primitive needs more vertices than one buffer holds.
    #[error("primitive of {vertices} vertices exceeds buffer capacity {capacity}")]
    PrimitiveTooLarge {
        /// Vertices in the primitive.
        vertices: usize,
        /// Vertices per buffer.
        capacity: usize,
    },

    /// The GPU backend failed.
    #[error("device error: {0}")]
    Device(String),

    /// Reading the scene tree failed while building a snapshot.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::NodeId;

    #[test]
    fn test_core_error_converts() {
        let err: RenderError = CoreError::StaleNode(NodeId::new(3, 1)).into();
        assert!(matches!(err, RenderError::Core(CoreError::StaleNode(_))));
        assert_eq!(err.to_string(), "stale node handle #3v1");
    }

    #[test]
    fn test_backpressure_message() {
        let err = RenderError::Backpressure { generation: 7, slot: 1 };
        assert!(err.to_string().contains("generation 7"));
    }
}
