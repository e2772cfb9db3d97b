//! Root directory switching via `chroot(2)`.
//!
//! Only the process's view of `/` changes; mounts are shared with the
//! host and a privileged process can break out. No `pivot_root` is
//! attempted because no mount namespace is created.

use std::ffi::CStr;
use std::fmt;

use nix::errno::Errno;

/// The step of jail entry that failed, with its errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JailFault {
    /// `chroot(2)` to the new root failed.
    Chroot(Errno),
    /// `chdir("/")` inside the new root failed.
    Chdir(Errno),
}

impl fmt::Display for JailFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chroot(errno) => write!(f, "chroot failed: {}", errno.desc()),
            Self::Chdir(errno) => write!(f, "chdir to new root failed: {}", errno.desc()),
        }
    }
}

/// Makes `root` the calling process's `/` and moves into it.
///
/// Called from the cloned child, so it logs nothing, does not allocate, and
/// reports the raw errno of the failing step. `root` is converted by the
/// caller before the clone.
///
/// # Errors
///
/// Returns the failing step; `chroot(2)` needs `CAP_SYS_CHROOT`.
#[cfg(target_os = "linux")]
pub fn enter_root(root: &CStr) -> Result<(), JailFault> {
    nix::unistd::chroot(root).map_err(JailFault::Chroot)?;
    nix::unistd::chdir(c"/").map_err(JailFault::Chdir)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always fails with `ENOSYS`.
#[cfg(not(target_os = "linux"))]
pub fn enter_root(_root: &CStr) -> Result<(), JailFault> {
    Err(JailFault::Chroot(Errno::ENOSYS))
}
