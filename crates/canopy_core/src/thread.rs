//! Explicit thread context.
//!
//! The tree records which thread owns it. Entry points query the guard
//! instead of ambient thread-local flags, so tests can rebind ownership.

use std::thread::ThreadId;

use crate::error::{CoreError, CoreResult};

/// Role a pipeline thread plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    /// Mutates the tree and writes snapshots.
    Update,
    /// Reads snapshots and submits GPU work.
    Draw,
    /// Enqueues input events.
    Input,
    /// Any thread the pipeline does not know about.
    Other,
}

/// What to do when the tree is misused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisusePolicy {
    /// Panic at the point of detection.
    Panic,
    /// Log and return the error, leaving the tree untouched.
    Reject,
}

impl Default for MisusePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Reject
        }
    }
}

impl MisusePolicy {
    /// Applies the policy to a detected misuse and hands the error back.
    ///
    /// # Panics
    ///
    /// Under [`MisusePolicy::Panic`].
    #[track_caller]
    pub fn report(self, error: CoreError) -> CoreError {
        match self {
            Self::Panic => panic!("scene graph misuse: {error}"),
            Self::Reject => {
                tracing::warn!(%error, "rejected scene graph misuse");
                error
            }
        }
    }
}

/// Binds a structure to the thread allowed to mutate it.
#[derive(Debug, Clone)]
pub struct ThreadGuard {
    owner: ThreadId,
    role: ThreadRole,
    draw: Option<ThreadId>,
}

impl ThreadGuard {
    /// Binds to the calling thread.
    #[must_use]
    pub fn current(role: ThreadRole) -> Self {
        Self {
            owner: std::thread::current().id(),
            role,
            draw: None,
        }
    }

    /// Rebinds ownership to the calling thread.
    pub fn rebind(&mut self) {
        self.owner = std::thread::current().id();
    }

    /// Registers the draw thread so a violation can name it.
    pub fn register_draw_thread(&mut self, id: ThreadId) {
        self.draw = Some(id);
    }

    /// Role of the owning thread.
    #[must_use]
    pub fn role(&self) -> ThreadRole {
        self.role
    }

    /// True when called from the owning thread.
    #[inline]
    #[must_use]
    pub fn is_owner(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    /// Fails with [`CoreError::WrongThread`] off the owning thread.
    ///
    /// # Errors
    ///
    /// When the calling thread is not the owner.
    #[inline]
    pub fn check(&self) -> CoreResult<()> {
        if self.is_owner() {
            return Ok(());
        }
        let actual = if Some(std::thread::current().id()) == self.draw {
            ThreadRole::Draw
        } else {
            ThreadRole::Other
        };
        Err(CoreError::WrongThread {
            expected: self.role,
            actual,
        })
    }
}
