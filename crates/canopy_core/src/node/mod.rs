//! Scene nodes and the tree that owns them.
//!
//! - [`SceneTree`]: arena, structure and thread ownership
//! - setters and cell reads live beside it in `props`
//! - propagation rules live in `propagate`, updaters in `compute`

mod compute;
mod data;
mod id;
mod propagate;
mod props;
mod tree;

pub use compute::NodeDrawState;
pub use data::{Capabilities, Node, Primitive, TextureId};
pub use id::NodeId;
pub use props::MAX_CUSTOM_CELLS;
pub use tree::{DepthFirst, SceneTree};
