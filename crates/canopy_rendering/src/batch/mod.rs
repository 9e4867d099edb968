//! Vertex batching.

mod state;
mod vertex;
mod vertex_batch;

pub use state::{PipelineState, ScissorRect, ShaderKind};
pub use vertex::TexturedVertex;
pub use vertex_batch::{BatchStats, SpillReason, VertexBatch};
