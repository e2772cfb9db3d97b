//! Local staging area for downloaded layer archives.
//!
//! Each build gets a private temporary directory. Archives are named after
//! their digest and removed once applied, so at most one archive is on disk
//! at a time; the directory itself is removed when the area is dropped.

use std::path::Path;

use corral_common::constants::{LAYER_ARCHIVE_SUFFIX, STAGING_DIR_PREFIX};
use corral_common::error::{CorralError, Result};
use tempfile::TempDir;

/// Returns the staging file name for `digest`: its encoded part plus `.tar.gz`.
///
/// # Errors
///
/// Returns `CorralError::Fetch` if the encoded part is empty or contains
/// characters that are not safe in a file name.
pub fn archive_file_name(digest: &str) -> Result<String> {
    let encoded = digest.split_once(':').map_or(digest, |(_, encoded)| encoded);
    let safe = !encoded.is_empty()
        && encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '=' | '_' | '-'));
    if !safe {
        return Err(CorralError::Fetch {
            digest: digest.to_string(),
            message: "digest is not usable as a file name".into(),
        });
    }
    Ok(format!("{encoded}{LAYER_ARCHIVE_SUFFIX}"))
}

/// Temporary directory holding layer archives for one build.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Creates a fresh staging directory under `scratch_dir`.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Filesystem` if the directory cannot be created.
    pub fn create(scratch_dir: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_DIR_PREFIX)
            .tempdir_in(scratch_dir)
            .map_err(|e| CorralError::filesystem(scratch_dir, e))?;
        tracing::debug!(path = %dir.path().display(), "layer staging area created");
        Ok(Self { dir })
    }

    /// Returns the staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Deletes a staged archive once it has been applied.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Filesystem` if the file cannot be removed.
    pub fn discard(&self, archive: &Path) -> Result<()> {
        std::fs::remove_file(archive).map_err(|e| CorralError::filesystem(archive, e))
    }
}
