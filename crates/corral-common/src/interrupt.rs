//! Cooperative interruption of a run.
//!
//! An [`Interrupt`] is shared by the code that requests a stop (a signal
//! handler) and the run being stopped. The run polls it between pipeline
//! steps and publishes the PID of its child once one exists, so requests
//! that arrive while the command runs can be forwarded to it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use crate::error::{CorralError, Result};

/// Shared interrupt state for one engine.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    requests: AtomicUsize,
    child: AtomicI32,
}

impl Interrupt {
    /// Creates interrupt state with no request recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request and returns how many have been made so far.
    pub fn request(&self) -> usize {
        self.shared.requests.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns how many requests have been made.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    /// Returns `true` once any request has been made.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requests() > 0
    }

    /// Fails with [`CorralError::Interrupted`] once a request has been made.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Interrupted` if the run should stop.
    pub fn check(&self) -> Result<()> {
        if self.is_requested() {
            return Err(CorralError::Interrupted);
        }
        Ok(())
    }

    /// Publishes the host PID of the run's child.
    pub fn attach_child(&self, pid: i32) {
        self.shared.child.store(pid, Ordering::SeqCst);
    }

    /// Clears the published child PID.
    pub fn detach_child(&self) {
        self.shared.child.store(0, Ordering::SeqCst);
    }

    /// Returns the published child PID, if any.
    #[must_use]
    pub fn child(&self) -> Option<i32> {
        let pid = self.shared.child.load(Ordering::SeqCst);
        (pid > 0).then_some(pid)
    }
}
