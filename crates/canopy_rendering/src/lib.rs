//! # Canopy Rendering
//!
//! The update side turns the scene tree into immutable frame snapshots; the
//! draw side turns published snapshots into batched GPU draw calls.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │        UPDATE THREAD         │        │         DRAW THREAD          │
//! ├──────────────────────────────┤        ├──────────────────────────────┤
//! │  SceneTree                   │        │  read_latest()               │
//! │     ↓                        │        │     ↓                        │
//! │  SnapshotBuilder (copy fwd)  │        │  Renderer::draw_frame        │
//! │     ↓                        │        │     ↓                        │
//! │  SnapshotRing::begin_write ──┼─ gen ─→│  VertexBatch → RenderDevice  │
//! │     ↓ publish (atomic)       │        │     ↓ present                │
//! └──────────────────────────────┘        └──────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - A slot is never overwritten while the draw thread holds it
//! - Every draw node in a published snapshot carries that snapshot's generation
//! - A batch spills before its pipeline state changes

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod batch;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod snapshot;

pub use batch::{BatchStats, PipelineState, ScissorRect, ShaderKind, SpillReason, TexturedVertex, VertexBatch};
pub use device::{DeviceCommand, PipelineLookup, QuadPipelines, RecordingDevice, RenderDevice, WgpuDevice, WgpuFrame};
pub use error::{RenderError, RenderResult};
pub use pipeline::{DrawStats, Renderer};
pub use snapshot::{BuildStats, DrawNode, FrameSnapshot, SnapshotBuilder, SnapshotReadGuard, SnapshotRing, SnapshotWriter};
