//! PID namespace isolation.
//!
//! The child is created directly inside a new PID namespace with
//! `clone(CLONE_NEWPID)`, so it observes itself as PID 1 while the
//! caller's own namespace membership is left untouched.

use corral_common::constants::SIGNAL_EXIT_OFFSET;
use corral_common::error::{CorralError, Result};
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

/// Stack reserved for the cloned child until it replaces itself with `execve`.
pub const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Entry point run by the cloned child; its return value is the exit status.
pub type ChildMain<'a> = Box<dyn FnMut() -> isize + 'a>;

/// Clones a child into a new PID namespace and returns its host PID.
///
/// The child runs `child_main` on a private stack inside a copy of the
/// caller's address space and inherits all open file descriptors,
/// including the standard streams. Only the calling thread is copied, so
/// `child_main` must restrict itself to raw system calls on memory prepared
/// in advance until it execs or returns.
///
/// # Errors
///
/// Returns `CorralError::Launch` if `clone(2)` fails, typically `EPERM`
/// without `CAP_SYS_ADMIN`.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn spawn_in_pid_namespace(child_main: ChildMain<'_>) -> Result<Pid> {
    use nix::sched::{CloneFlags, clone};
    use nix::sys::signal::Signal;

    let mut stack = vec![0_u8; CHILD_STACK_SIZE];

    // SAFETY: without CLONE_VM the child works on a copy of this address
    // space, so the stack buffer stays valid for it after the parent frees
    // its own copy. Other threads are not copied and may hold allocator
    // locks, so `child_main` must not allocate; callers prepare every
    // buffer it touches before calling this.
    let pid = unsafe {
        clone(
            child_main,
            &mut stack,
            CloneFlags::CLONE_NEWPID,
            Some(Signal::SIGCHLD as i32),
        )
    }
    .map_err(|e| CorralError::launch(format!("clone(CLONE_NEWPID) failed: {e}")))?;

    tracing::debug!(pid = pid.as_raw(), "child cloned into new PID namespace");
    Ok(pid)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: PID namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn spawn_in_pid_namespace(_child_main: ChildMain<'_>) -> Result<Pid> {
    Err(CorralError::Config {
        message: "Linux required for PID namespace isolation".into(),
    })
}

/// Blocks until `pid` terminates and returns its exit status.
///
/// # Errors
///
/// Returns `CorralError::Launch` if `waitpid(2)` fails for a reason other
/// than an interrupted call.
pub fn wait_for_exit(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(code) = exit_code(status) {
                    tracing::debug!(pid = pid.as_raw(), code, "child reaped");
                    return Ok(code);
                }
            }
            Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(CorralError::launch(format!("waitpid({pid}) failed: {e}")));
            }
        }
    }
}

/// Maps a terminal wait status to a shell-style exit status.
///
/// A normal exit yields its code; death by signal `N` yields `128 + N`.
/// Non-terminal statuses yield `None`.
#[must_use]
pub fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(SIGNAL_EXIT_OFFSET + signal as i32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    #[test]
    fn exit_code_passes_normal_status_through() {
        let status = WaitStatus::Exited(Pid::from_raw(42), 3);
        assert_eq!(exit_code(status), Some(3));
    }

    #[test]
    fn exit_code_maps_signals_shell_style() {
        let status = WaitStatus::Signaled(Pid::from_raw(42), Signal::SIGKILL, false);
        assert_eq!(exit_code(status), Some(137));
    }

    #[test]
    fn exit_code_ignores_stop_events() {
        let status = WaitStatus::Stopped(Pid::from_raw(42), Signal::SIGSTOP);
        assert_eq!(exit_code(status), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[ignore = "requires CAP_SYS_ADMIN to create a PID namespace"]
    fn cloned_child_is_pid_one() {
        let pid = spawn_in_pid_namespace(Box::new(|| {
            if nix::unistd::getpid().as_raw() == 1 { 0 } else { 1 }
        }))
        .expect("clone");
        assert_eq!(wait_for_exit(pid).expect("wait"), 0);
    }
}
