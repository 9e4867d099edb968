//! The draw pass.
//!
//! Runs on the draw thread only; reads published snapshots, never the tree.

mod draw;
mod stats;

pub use draw::{emit_vertices, Renderer};
pub use stats::DrawStats;
