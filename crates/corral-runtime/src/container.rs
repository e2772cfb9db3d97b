//! The per-run container root.
//!
//! Every run owns exactly one [`EphemeralRoot`]: a fresh directory under the
//! scratch directory that becomes the jailed process's `/`. It is removed
//! recursively when dropped, so early returns clean up as well as normal
//! completion.

use std::path::Path;

use corral_common::constants::ROOTFS_DIR_PREFIX;
use corral_common::error::{CorralError, Result};
use corral_common::types::RunId;
use tempfile::TempDir;

/// Temporary root directory for one run.
#[derive(Debug)]
pub struct EphemeralRoot {
    dir: TempDir,
    populated: bool,
}

impl EphemeralRoot {
    /// Creates an empty root under `scratch_dir`, named after `run_id`.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Filesystem` if the directory cannot be created.
    pub fn create(scratch_dir: &Path, run_id: &RunId) -> Result<Self> {
        let prefix = format!("{ROOTFS_DIR_PREFIX}{run_id}-");
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(scratch_dir)
            .map_err(|e| CorralError::filesystem(scratch_dir, e))?;
        tracing::debug!(path = %dir.path().display(), "ephemeral root created");
        Ok(Self {
            dir,
            populated: false,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Records that an image has been built into this root.
    pub const fn mark_populated(&mut self) {
        self.populated = true;
    }

    /// Returns whether an image has been built into this root.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        self.populated
    }

    /// Removes the root now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Filesystem` if the tree cannot be removed.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|e| CorralError::filesystem(&path, e))?;
        tracing::debug!(path = %path.display(), "ephemeral root removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_root_is_empty_and_unpopulated() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let root = EphemeralRoot::create(scratch.path(), &RunId::new("abc")).expect("create");
        assert!(!root.is_populated());
        assert!(root.path().starts_with(scratch.path()));
        assert!(std::fs::read_dir(root.path()).expect("read_dir").next().is_none());
    }

    #[test]
    fn root_name_carries_run_id() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let root = EphemeralRoot::create(scratch.path(), &RunId::new("run42")).expect("create");
        let name = root.path().file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.starts_with("corral-root-run42-"), "{name}");
    }

    #[test]
    fn mark_populated_sticks() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let mut root = EphemeralRoot::create(scratch.path(), &RunId::generate()).expect("create");
        root.mark_populated();
        assert!(root.is_populated());
    }

    #[test]
    fn drop_removes_tree() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let root = EphemeralRoot::create(scratch.path(), &RunId::generate()).expect("create");
        std::fs::create_dir_all(root.path().join("usr/bin")).expect("mkdir");
        std::fs::write(root.path().join("usr/bin/tool"), b"x").expect("write");
        let path = root.path().to_path_buf();
        drop(root);
        assert!(!path.exists());
    }

    #[test]
    fn close_removes_tree() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let root = EphemeralRoot::create(scratch.path(), &RunId::generate()).expect("create");
        let path = root.path().to_path_buf();
        root.close().expect("close");
        assert!(!path.exists());
    }

    #[test]
    fn missing_scratch_dir_is_filesystem_error() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let result = EphemeralRoot::create(&scratch.path().join("absent"), &RunId::generate());
        assert!(matches!(result, Err(CorralError::Filesystem { .. })));
    }
}
