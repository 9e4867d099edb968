//! # Canopy
//!
//! Runs a scene graph application on two long-lived threads:
//!
//! - **canopy-update** owns the [`SceneTree`](canopy_core::SceneTree). Each
//!   tick it drains input, runs scheduled tasks, calls [`App::update`] and
//!   publishes a frame snapshot.
//! - **canopy-draw** owns the [`RenderDevice`](canopy_rendering::RenderDevice)
//!   and draws every new generation it sees.
//!
//! ```no_run
//! use canopy::{App, GameHost, UpdateContext};
//! use canopy_core::{CoreResult, PipelineConfig, Primitive};
//! use canopy_rendering::RecordingDevice;
//!
//! struct Hello;
//!
//! impl App for Hello {
//!     type Input = ();
//!
//!     fn load(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
//!         let root = ctx.tree.root();
//!         let quad = ctx.tree.create_leaf(Primitive::solid_quad())?;
//!         ctx.tree.attach(root, quad)
//!     }
//!
//!     fn update(&mut self, _ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! let host = GameHost::run(Hello, RecordingDevice::counting(), PipelineConfig::default())?;
//! let report = host.shutdown()?;
//! println!("{} frames", report.frames_drawn);
//! # Ok::<(), canopy::HostError>(())
//! ```

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod app;
pub mod error;
pub mod host;

pub use app::{App, UpdateContext};
pub use error::{HostError, HostResult};
pub use host::{GameHost, HostHandle, HostReport, DRAW_THREAD, UPDATE_THREAD};
