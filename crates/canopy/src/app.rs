//! The application side of the host.
//!
//! An [`App`] lives on the update thread. It sees the tree only through an
//! [`UpdateContext`], once at load and once per tick.

use canopy_core::{CoreResult, FrameClock, SceneTree, Scheduler};

/// Per-tick view handed to the application on the update thread.
pub struct UpdateContext<'a> {
    /// The scene graph. Only ever borrowed on the update thread.
    pub tree: &'a mut SceneTree,
    /// Deferred work, drained at the start of the next tick.
    pub scheduler: &'a mut Scheduler<SceneTree>,
    /// Shared clock, already advanced for this tick.
    pub clock: &'a FrameClock,
    /// Tick number; 0 during load.
    pub tick: u64,
    /// Milliseconds since the previous tick.
    pub delta_ms: f64,
}

impl UpdateContext<'_> {
    /// Clock time of this tick in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }
}

impl std::fmt::Debug for UpdateContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateContext")
            .field("tick", &self.tick)
            .field("delta_ms", &self.delta_ms)
            .field("now_ms", &self.now_ms())
            .finish_non_exhaustive()
    }
}

/// A program driven by the host's update thread.
///
/// Errors returned from any hook stop the pipeline; the host reports them
/// from [`crate::HostHandle::shutdown`].
pub trait App: Send + 'static {
    /// Events input threads send through [`crate::HostHandle::input_sender`].
    type Input: Send + 'static;

    /// Builds the initial tree. Runs once, before the first tick.
    ///
    /// # Errors
    ///
    /// Any scene graph error aborts startup.
    fn load(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()>;

    /// Handles one drained input event, in arrival order.
    ///
    /// # Errors
    ///
    /// Any scene graph error stops the pipeline.
    fn input(&mut self, ctx: &mut UpdateContext<'_>, event: Self::Input) -> CoreResult<()> {
        let _ = (ctx, event);
        Ok(())
    }

    /// Advances the application by one tick, after scheduled tasks ran.
    ///
    /// # Errors
    ///
    /// Any scene graph error stops the pipeline.
    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()>;
}
