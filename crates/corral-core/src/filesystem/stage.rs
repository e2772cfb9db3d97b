//! Staging a host executable into an empty jail.
//!
//! Used when a command runs without an image: the binary is resolved on the
//! host `PATH` and copied into the jail at the same absolute location. Its
//! shared-library dependencies are not copied, so only statically linked
//! programs are expected to start.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use corral_common::constants::STAGED_EXECUTABLE_MODE;
use corral_common::error::{CorralError, Result};

/// Returns where a host path lands inside `root`.
#[must_use]
pub fn jailed_path(root: &Path, host_path: &Path) -> PathBuf {
    root.join(host_path.strip_prefix("/").unwrap_or(host_path))
}

/// Copies the host executable for `command` into `root` and marks it executable.
///
/// Returns the path of the staged copy.
///
/// # Errors
///
/// Returns `CorralError::Launch` if `command` cannot be resolved on the host
/// search path, or `CorralError::Filesystem` if the copy or chmod fails.
pub fn stage_executable(command: &str, root: &Path) -> Result<PathBuf> {
    let host_path = which::which(command).map_err(|e| {
        CorralError::launch(format!(
            "command '{command}' not found on the host search path: {e}"
        ))
    })?;
    let target = jailed_path(root, &host_path);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| CorralError::filesystem(parent, e))?;
    }
    let bytes = fs::copy(&host_path, &target).map_err(|e| CorralError::filesystem(&target, e))?;
    fs::set_permissions(&target, fs::Permissions::from_mode(STAGED_EXECUTABLE_MODE))
        .map_err(|e| CorralError::filesystem(&target, e))?;

    tracing::info!(
        host = %host_path.display(),
        jailed = %target.display(),
        bytes,
        "staged executable (shared libraries are not copied)"
    );
    Ok(target)
}
