//! Interrupt delivery for a run in progress.
//!
//! An [`InterruptHandle`] is what a signal handler holds. Triggering it
//! stops a run that is still pulling or staging, and forwards to the jailed
//! command once one runs: `SIGINT` on the first request and `SIGKILL` on
//! every later one. The command is PID 1 of its namespace, so it only
//! reacts to `SIGINT` if it installed a handler for it.

use corral_common::interrupt::Interrupt;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Cloneable, thread-safe trigger for an engine's interrupt.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    interrupt: Interrupt,
}

impl InterruptHandle {
    pub(crate) const fn new(interrupt: Interrupt) -> Self {
        Self { interrupt }
    }

    /// Requests the run to stop and signals its command, if one runs.
    pub fn trigger(&self) {
        let requests = self.interrupt.request();
        match self.interrupt.child() {
            Some(pid) => forward(Pid::from_raw(pid), requests),
            None => tracing::info!(requests, "interrupt requested"),
        }
    }
}

/// Publishes `pid` as the run's child and delivers any request that
/// arrived before it existed.
pub(crate) fn attach_child(interrupt: &Interrupt, pid: Pid) {
    interrupt.attach_child(pid.as_raw());
    let requests = interrupt.requests();
    if requests > 0 {
        forward(pid, requests);
    }
}

/// Signal sent to the command for the `requests`-th interrupt.
const fn signal_for(requests: usize) -> Signal {
    if requests > 1 {
        Signal::SIGKILL
    } else {
        Signal::SIGINT
    }
}

fn forward(pid: Pid, requests: usize) {
    let signal = signal_for(requests);
    match kill(pid, signal) {
        Ok(()) => tracing::info!(pid = pid.as_raw(), %signal, "interrupt forwarded"),
        Err(e) => tracing::warn!(pid = pid.as_raw(), %signal, error = %e, "cannot forward interrupt"),
    }
}
