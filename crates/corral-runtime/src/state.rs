//! Run state tracking.
//!
//! Each run moves through [`RunState`] once. Every accepted transition is
//! logged and handed to the registered observers together with the run's
//! root directory.

use std::path::{Path, PathBuf};

use corral_common::error::Result;
use corral_common::types::{RunId, RunState};

/// A state change of one run.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    /// The run that changed state.
    pub run_id: &'a RunId,
    /// State before the change.
    pub from: RunState,
    /// State after the change.
    pub to: RunState,
    /// The run's ephemeral root.
    pub root: &'a Path,
}

/// Callback invoked on every transition.
pub type TransitionObserver = Box<dyn Fn(&Transition<'_>)>;

/// Current state of one run plus the observers to notify.
pub struct StateTracker<'a> {
    run_id: &'a RunId,
    root: PathBuf,
    state: RunState,
    observers: &'a [TransitionObserver],
}

impl<'a> StateTracker<'a> {
    /// Starts tracking a run in [`RunState::Created`].
    #[must_use]
    pub fn new(run_id: &'a RunId, root: &Path, observers: &'a [TransitionObserver]) -> Self {
        Self {
            run_id,
            root: root.to_path_buf(),
            state: RunState::Created,
            observers,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Moves to `next` and notifies observers.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Config` if the transition is illegal; the state
    /// is left unchanged.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        let from = self.state;
        self.state = from.advance(next)?;
        tracing::debug!(run_id = %self.run_id, %from, to = %next, "run state changed");
        let transition = Transition {
            run_id: self.run_id,
            from,
            to: next,
            root: &self.root,
        };
        for observer in self.observers {
            observer(&transition);
        }
        Ok(())
    }

    /// Records a launch failure unless the run already finished.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            let _ = self.advance(RunState::LaunchFailed);
        }
    }
}

impl std::fmt::Debug for StateTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTracker")
            .field("run_id", self.run_id)
            .field("root", &self.root)
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}
