//! Render device contract.
//!
//! The draw pass talks to the GPU only through [`RenderDevice`]. The platform
//! backend supplies one; [`RecordingDevice`] is the headless implementation
//! used in tests and soak runs.

mod gpu;
mod recording;

pub use gpu::{PipelineLookup, QuadPipelines, RecordedDraw, WgpuDevice, WgpuFrame, QUAD_SHADER};
pub use recording::{DeviceCommand, RecordingDevice};

use std::ops::Range;

use crate::batch::PipelineState;
use crate::error::RenderResult;

/// GPU operations the draw thread needs.
///
/// Implementations are owned by the draw thread for its whole lifetime.
pub trait RenderDevice {
    /// Handle to one vertex buffer.
    type VertexBuffer;

    /// Allocates a vertex buffer of `size_bytes`.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Device`] on backend failure.
    fn create_vertex_buffer(&mut self, size_bytes: u64) -> RenderResult<Self::VertexBuffer>;

    /// Copies `bytes` into `buffer` at `offset_bytes`.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Device`] on backend failure.
    fn upload_vertices(&mut self, buffer: &Self::VertexBuffer, offset_bytes: u64, bytes: &[u8]) -> RenderResult<()>;

    /// Draws `vertices` of `buffer` as a triangle list under `state`.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Device`] on backend failure.
    fn draw(&mut self, buffer: &Self::VertexBuffer, vertices: Range<u32>, state: &PipelineState) -> RenderResult<()>;

    /// Submits every draw recorded so far, ahead of [`Self::present`]. Once
    /// it returns, buffers those draws read may be overwritten.
    ///
    /// Backends that execute draws as they are issued keep the default.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Device`] on backend failure.
    fn flush(&mut self) -> RenderResult<()> {
        Ok(())
    }

    /// Requests a frame buffer for `generation`.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Device`] on backend failure.
    fn begin_frame(&mut self, generation: u64) -> RenderResult<()>;

    /// Presents the frame.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Device`] on backend failure.
    fn present(&mut self) -> RenderResult<()>;
}
