//! # Canopy Core
//!
//! Retained-mode scene graph with pull-based layout caching.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       UPDATE THREAD                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Input Queue → Scheduler → App Update → Node Setters         │
//! │                                             ↓                │
//! │                          Invalidation (up / down)            │
//! │                                             ↓                │
//! │                          Layout Cells (lazy, pull on read)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - The tree is mutated by one thread only (see [`thread::ThreadGuard`])
//! - Invalidating an already invalid cell is a no-op and prunes the walk
//! - A cell never hands out a stale value; an unwired cell is an error

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod invalidation;
pub mod layout;
pub mod node;
pub mod scheduler;
pub mod telemetry;
pub mod thread;

pub use clock::FrameClock;
pub use config::PipelineConfig;
pub use error::{ConfigError, CoreError, CoreResult};
pub use geometry::{Axes, Rect, Rgba};
pub use input::{InputQueue, InputSender};
pub use invalidation::{Invalidation, InvalidationSource};
pub use layout::{CellHandle, CellKey, CellUpdater, LayoutCell};
pub use node::{Capabilities, NodeDrawState, NodeId, Primitive, SceneTree, TextureId};
pub use scheduler::{ScheduledHandle, Scheduler, SchedulerSender};
pub use telemetry::{AtomicStats, Counter, StatsSink, Telemetry};
pub use thread::{MisusePolicy, ThreadGuard, ThreadRole};
