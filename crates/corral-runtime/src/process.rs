//! Launching the command inside the jail.
//!
//! A launch goes through three steps, each a separate type so they cannot be
//! taken out of order:
//!
//! 1. [`Launch::spawn`] clones a child into a new PID namespace. The child
//!    enters the root with `chroot(2)` and `execvp`s the command, using only
//!    buffers the parent prepared before the clone.
//! 2. [`Launch::await_exec`] blocks until the child has either replaced
//!    itself with the command or reported why it could not.
//! 3. [`RunningChild::wait`] blocks until the command terminates.
//!
//! The child reports setup failures over a close-on-exec pipe as eight
//! bytes: the failing stage and the errno, both native-endian `i32`. A
//! successful `execvp` closes the pipe without writing, so the parent sees
//! end-of-file with nothing read.
//!
//! Only the filesystem root and the PID namespace are isolated. Mounts,
//! network, users, IPC and hostname are shared with the host, no resource
//! limits apply, and a process running as root can leave a `chroot`.

use std::ffi::CString;

use corral_common::error::{CorralError, Result};
use corral_core::filesystem::stage::stage_executable;
use nix::errno::Errno;
use nix::unistd::Pid;

use crate::container::EphemeralRoot;

/// Exit status of a child that failed before `execvp` succeeded.
const SETUP_FAILURE_STATUS: isize = 127;

/// Size of a setup failure report on the pipe.
const REPORT_LEN: usize = 8;

/// The command to run and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Program name or path, resolved with the jail's `PATH` semantics.
    pub command: String,
    /// Arguments after the program name.
    pub args: Vec<String>,
}

impl ExecutionRequest {
    /// Creates a request for `command` with `args`.
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds the `argv` vector: the command followed by its arguments.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Launch` if the command is empty or any element
    /// contains a NUL byte.
    pub fn argv(&self) -> Result<Vec<CString>> {
        if self.command.is_empty() {
            return Err(CorralError::launch("command is empty"));
        }
        std::iter::once(&self.command)
            .chain(&self.args)
            .map(|arg| {
                CString::new(arg.as_bytes())
                    .map_err(|_| CorralError::launch(format!("argument {arg:?} contains a NUL byte")))
            })
            .collect()
    }
}

/// The step of child setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SetupStage {
    /// `chroot(2)` into the root.
    Chroot = 1,
    /// `chdir("/")` after the chroot.
    Chdir = 2,
    /// `execvp` of the command.
    Exec = 3,
}

impl SetupStage {
    const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Chroot),
            2 => Some(Self::Chdir),
            3 => Some(Self::Exec),
            _ => None,
        }
    }
}

/// A setup failure reported by the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupFailure {
    /// Where the child stopped.
    pub stage: SetupStage,
    /// The errno of the failing call.
    pub errno: Errno,
}

impl SetupFailure {
    /// Encodes the failure for the report pipe.
    #[must_use]
    pub fn encode(self) -> [u8; REPORT_LEN] {
        let mut report = [0_u8; REPORT_LEN];
        report[..4].copy_from_slice(&(self.stage as i32).to_ne_bytes());
        report[4..].copy_from_slice(&(self.errno as i32).to_ne_bytes());
        report
    }

    /// Decodes everything read from the report pipe.
    ///
    /// An empty report means the exec succeeded.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Launch` if the report is truncated or names an
    /// unknown stage.
    pub fn decode(report: &[u8]) -> Result<Option<Self>> {
        if report.is_empty() {
            return Ok(None);
        }
        let Ok(bytes) = <[u8; REPORT_LEN]>::try_from(report) else {
            return Err(CorralError::launch(format!(
                "malformed setup report of {} bytes from child",
                report.len()
            )));
        };
        let [s0, s1, s2, s3, e0, e1, e2, e3] = bytes;
        let stage_code = i32::from_ne_bytes([s0, s1, s2, s3]);
        let errno = Errno::from_raw(i32::from_ne_bytes([e0, e1, e2, e3]));
        let stage = SetupStage::from_code(stage_code).ok_or_else(|| {
            CorralError::launch(format!("child reported unknown setup stage {stage_code}"))
        })?;
        Ok(Some(Self { stage, errno }))
    }

    fn into_error(self, command: &str) -> CorralError {
        let reason = self.errno.desc();
        match self.stage {
            SetupStage::Chroot => CorralError::launch(format!("chroot into the root failed: {reason}")),
            SetupStage::Chdir => CorralError::launch(format!("chdir to / inside the root failed: {reason}")),
            SetupStage::Exec => CorralError::launch(format!("exec of '{command}' failed: {reason}")),
        }
    }
}

/// Stages the host executable into `root` unless an image populated it.
///
/// # Errors
///
/// Returns `CorralError::Launch` if the command cannot be found on the host,
/// or `CorralError::Filesystem` if the copy fails.
pub fn prepare_root(request: &ExecutionRequest, root: &EphemeralRoot) -> Result<()> {
    if root.is_populated() {
        return Ok(());
    }
    let staged = stage_executable(&request.command, root.path())?;
    tracing::warn!(
        command = %request.command,
        staged = %staged.display(),
        "running a host executable without its shared libraries"
    );
    Ok(())
}

/// A cloned child that has not yet reported on its exec.
#[derive(Debug)]
#[must_use = "a spawned child must be awaited"]
pub struct Launch {
    pid: Pid,
    command: String,
    report: std::fs::File,
}

/// A child that is executing the requested command.
#[derive(Debug)]
#[must_use = "a running child must be waited for"]
pub struct RunningChild {
    pid: Pid,
}

impl Launch {
    /// Clones the child that will enter `root` and exec `request`.
    ///
    /// Every buffer the child touches (the root path, `argv` and its
    /// pointer array) is built here, before the clone.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Launch` if the root path or argument vector is
    /// invalid or the report pipe or `clone(2)` fails.
    #[cfg(target_os = "linux")]
    #[allow(unsafe_code)]
    pub fn spawn(request: &ExecutionRequest, root: &std::path::Path) -> Result<Self> {
        use std::os::unix::ffi::OsStrExt;

        use corral_core::filesystem::chroot::{JailFault, enter_root};
        use corral_core::namespace::pid::spawn_in_pid_namespace;
        use nix::fcntl::OFlag;
        use nix::unistd::{pipe2, write};

        let root_c = CString::new(root.as_os_str().as_bytes()).map_err(|_| {
            CorralError::launch(format!("root path {} contains a NUL byte", root.display()))
        })?;
        let argv = request.argv()?;
        let Some(program) = argv.first() else {
            return Err(CorralError::launch("command is empty"));
        };
        let argv_ptrs: Vec<*const libc::c_char> = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| CorralError::launch(format!("cannot create report pipe: {e}")))?;

        tracing::info!(
            command = %request.command,
            args = ?request.args,
            root = %root.display(),
            "launching"
        );
        let pid = spawn_in_pid_namespace(Box::new(|| {
            let failure = match enter_root(&root_c) {
                Err(JailFault::Chroot(errno)) => SetupFailure {
                    stage: SetupStage::Chroot,
                    errno,
                },
                Err(JailFault::Chdir(errno)) => SetupFailure {
                    stage: SetupStage::Chdir,
                    errno,
                },
                Ok(()) => {
                    // SAFETY: `program` and every pointer in `argv_ptrs` point
                    // into `argv`, which outlives the call, and the array is
                    // NULL-terminated. execvp only returns on failure.
                    let _ = unsafe { libc::execvp(program.as_ptr(), argv_ptrs.as_ptr()) };
                    SetupFailure {
                        stage: SetupStage::Exec,
                        errno: Errno::last(),
                    }
                }
            };
            let _ = write(&write_end, &failure.encode());
            SETUP_FAILURE_STATUS
        }))?;
        drop(write_end);

        Ok(Self {
            pid,
            command: request.command.clone(),
            report: std::fs::File::from(read_end),
        })
    }

    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns an error: PID namespaces require Linux.
    #[cfg(not(target_os = "linux"))]
    pub fn spawn(_request: &ExecutionRequest, _root: &std::path::Path) -> Result<Self> {
        Err(CorralError::Config {
            message: "Linux required for PID namespace isolation".into(),
        })
    }

    /// Returns the child's PID in the host namespace.
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Waits until the child has exec'd the command or reported a failure.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Launch` if the child could not enter the root
    /// or exec the command, or its report cannot be read. The child has
    /// been reaped when this returns an error.
    pub fn await_exec(self) -> Result<RunningChild> {
        use std::io::Read;

        let Self {
            pid,
            command,
            mut report,
        } = self;
        let mut bytes = Vec::with_capacity(REPORT_LEN);
        let outcome = report
            .read_to_end(&mut bytes)
            .map_err(|e| CorralError::launch(format!("cannot read setup report: {e}")))
            .and_then(|_| SetupFailure::decode(&bytes));

        match outcome {
            Ok(None) => {
                tracing::debug!(pid = pid.as_raw(), command = %command, "command executing");
                Ok(RunningChild { pid })
            }
            Ok(Some(failure)) => {
                reap(pid);
                Err(failure.into_error(&command))
            }
            Err(e) => {
                reap(pid);
                Err(e)
            }
        }
    }
}

impl RunningChild {
    /// Blocks until the command terminates and returns its exit status.
    ///
    /// Death by signal `N` is reported as `128 + N`.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Launch` if waiting fails.
    pub fn wait(self) -> Result<i32> {
        let code = corral_core::namespace::pid::wait_for_exit(self.pid)?;
        tracing::info!(pid = self.pid.as_raw(), code, "command exited");
        Ok(code)
    }
}

fn reap(pid: Pid) {
    if let Err(e) = corral_core::namespace::pid::wait_for_exit(pid) {
        tracing::warn!(pid = pid.as_raw(), error = %e, "could not reap failed child");
    }
}
