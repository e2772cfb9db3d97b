//! Unified error type for the corral workspace.
//!
//! Every pipeline stage reports through one of these variants so the CLI can
//! decide the exit status in a single place.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CorralError {
    /// An image reference string could not be parsed.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference {
        /// The raw reference as given.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The registry token endpoint refused or returned an unusable token.
    #[error("registry authentication failed for {repository}: {message}")]
    Auth {
        /// Repository the token was requested for.
        repository: String,
        /// Description of the failure.
        message: String,
    },

    /// The image manifest could not be retrieved or decoded.
    #[error("manifest resolution failed for {repository}:{reference}: {message}")]
    Manifest {
        /// Repository the manifest belongs to.
        repository: String,
        /// Tag or digest requested.
        reference: String,
        /// Description of the failure.
        message: String,
    },

    /// A layer blob could not be downloaded or stored.
    #[error("failed to fetch blob {digest}: {message}")]
    Fetch {
        /// Digest of the blob.
        digest: String,
        /// Description of the failure.
        message: String,
    },

    /// A layer archive could not be unpacked.
    #[error("failed to extract {archive}: {source}")]
    Extract {
        /// Archive being applied.
        archive: PathBuf,
        /// Underlying decode or write error.
        source: std::io::Error,
    },

    /// A local filesystem operation failed.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The isolated process could not be started or waited on.
    #[error("launch failed: {message}")]
    Launch {
        /// Description of the failure.
        message: String,
    },

    /// The run was interrupted before its command was started.
    #[error("run interrupted")]
    Interrupted,

    /// A configuration value or a lifecycle transition is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl CorralError {
    /// Builds a [`CorralError::Filesystem`] for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`CorralError::Launch`] from any displayable message.
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CorralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_error_names_repository_and_reference() {
        let err = CorralError::Manifest {
            repository: "library/redis".into(),
            reference: "7".into(),
            message: "HTTP 404".into(),
        };
        assert_eq!(
            err.to_string(),
            "manifest resolution failed for library/redis:7: HTTP 404"
        );
    }

    #[test]
    fn filesystem_helper_keeps_path() {
        let err = CorralError::filesystem(
            "/tmp/x",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, CorralError::Filesystem { ref path, .. } if path.ends_with("x")));
    }
}
