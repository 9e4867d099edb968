//! Frame snapshots and the ring that hands them to the draw thread.

mod builder;
mod draw_node;
mod frame;
mod ring;

pub use builder::{BuildStats, SnapshotBuilder};
pub use draw_node::DrawNode;
pub use frame::FrameSnapshot;
pub use ring::{SnapshotReadGuard, SnapshotRing, SnapshotWriter};
