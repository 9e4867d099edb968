//! Host error types.

use canopy_core::{ConfigError, CoreError};
use canopy_rendering::RenderError;
use thiserror::Error;

/// Errors raised while starting, running or stopping the host.
#[derive(Error, Debug)]
pub enum HostError {
    /// The pipeline configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A scene graph operation failed on the update thread.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Snapshot or draw failure.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The OS refused to start a pipeline thread.
    #[error("failed to spawn {thread}: {source}")]
    Spawn {
        /// Thread name.
        thread: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    /// The update thread stopped before the app finished loading.
    #[error("update thread exited during load")]
    LoadAborted,

    /// The pipeline threads were already joined.
    #[error("host already stopped")]
    Stopped,
}

/// Result alias for host operations.
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_passes_through() {
        let err: HostError = CoreError::RootImmutable.into();
        assert_eq!(err.to_string(), CoreError::RootImmutable.to_string());
    }

    #[test]
    fn test_panic_names_thread() {
        assert_eq!(HostError::ThreadPanicked("canopy-draw").to_string(), "canopy-draw thread panicked");
    }
}
