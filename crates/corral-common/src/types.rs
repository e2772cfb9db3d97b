//! Domain primitive types used across the corral workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{CorralError, Result};

/// Unique identifier for one corral invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Creates a run ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random run ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The part of an image reference that selects one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// A mutable tag such as `latest` or `7`.
    Tag(String),
    /// A content digest such as `sha256:...`.
    Digest(String),
}

impl Selector {
    /// Returns the path segment used on the manifest endpoint.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(tag) => tag,
            Self::Digest(digest) => digest,
        }
    }
}

/// A parsed `repository[:tag]` or `repository@digest` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Repository name exactly as given (e.g. `redis` or `bitnami/redis`).
    pub repository: String,
    /// Tag or digest.
    pub selector: Selector,
}

impl ImageReference {
    /// Parses a reference string.
    ///
    /// A string containing `@` is split there into repository and digest.
    /// Otherwise it is split on the last `:` into repository and tag, and
    /// a string with neither separator gets the `latest` tag.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::InvalidReference` for empty parts, malformed
    /// digests, and `host:port` references, which this rule cannot tell
    /// apart from a tag.
    pub fn parse(raw: &str) -> Result<Self> {
        let input = raw.trim();
        let invalid = |reason: &str| CorralError::InvalidReference {
            reference: raw.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let (repository, selector) = if let Some((name, digest)) = input.split_once('@') {
            let well_formed = digest
                .split_once(':')
                .is_some_and(|(algo, hex)| !algo.is_empty() && !hex.is_empty());
            if !well_formed {
                return Err(invalid("digest must have the form <algorithm>:<hex>"));
            }
            (name, Selector::Digest(digest.to_string()))
        } else if let Some((name, tag)) = input.rsplit_once(':') {
            if tag.contains('/') {
                return Err(invalid(
                    "ambiguous ':' (registry host:port references are not supported)",
                ));
            }
            if tag.is_empty() {
                return Err(invalid("tag is empty"));
            }
            (name, Selector::Tag(tag.to_string()))
        } else {
            (input, Selector::Tag(constants::DEFAULT_TAG.to_string()))
        };

        if repository.is_empty() {
            return Err(invalid("repository is empty"));
        }
        if repository.contains(':') {
            return Err(invalid(
                "repository contains ':' (registry host:port references are not supported)",
            ));
        }

        Ok(Self {
            repository: repository.to_string(),
            selector,
        })
    }

    /// Returns the repository path on the registry.
    ///
    /// Single-component names live in the official `library/` namespace.
    #[must_use]
    pub fn repository_path(&self) -> String {
        if self.repository.contains('/') {
            self.repository.clone()
        } else {
            format!("{}/{}", constants::OFFICIAL_NAMESPACE, self.repository)
        }
    }
}

impl FromStr for ImageReference {
    type Err = CorralError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::Tag(tag) => write!(f, "{}:{tag}", self.repository),
            Selector::Digest(digest) => write!(f, "{}@{digest}", self.repository),
        }
    }
}

/// Bearer token scoped to pulling one repository.
///
/// The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    repository: String,
}

impl AuthToken {
    /// Wraps a token issued for `repository`.
    #[must_use]
    pub fn new(value: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            repository: repository.into(),
        }
    }

    /// Returns the raw token.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Returns the repository path the token was issued for.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }

    /// Checks that the token may be presented for `repository`.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Auth` if the token was issued for another repository.
    pub fn ensure_scope(&self, repository: &str) -> Result<()> {
        if self.repository == repository {
            Ok(())
        } else {
            Err(CorralError::Auth {
                repository: repository.to_string(),
                message: format!("token is scoped to {}", self.repository),
            })
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("repository", &self.repository)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// One layer entry of an image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Content digest (`<algorithm>:<hex>`).
    pub digest: String,
    /// Compressed size in bytes, when the registry reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Layer media type, when the registry reports it.
    #[serde(
        rename = "mediaType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub media_type: Option<String>,
}

impl LayerDescriptor {
    /// Creates a descriptor carrying only a digest.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            size: None,
            media_type: None,
        }
    }
}

/// Lifecycle state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// The ephemeral root exists and is empty.
    Created,
    /// Image layers have been applied to the root.
    RootBuilt,
    /// The child exists in its own PID namespace and is entering the root.
    Jailed,
    /// The command has been executed inside the jail.
    Running,
    /// The command terminated with the given exit status.
    Exited(i32),
    /// The command could not be started.
    LaunchFailed,
}

impl RunState {
    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited(_) | Self::LaunchFailed)
    }

    /// Returns whether `self -> next` is a legal transition.
    ///
    /// `RootBuilt` may be skipped (bare jail). `LaunchFailed` is reachable
    /// from every non-terminal state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Created, Self::RootBuilt | Self::Jailed)
            | (Self::RootBuilt, Self::Jailed)
            | (Self::Jailed, Self::Running)
            | (Self::Running, Self::Exited(_)) => true,
            (from, Self::LaunchFailed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Config` if the transition is not legal.
    pub fn advance(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CorralError::Config {
                message: format!("illegal run state transition {self} -> {next}"),
            })
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::RootBuilt => write!(f, "root-built"),
            Self::Jailed => write!(f, "jailed"),
            Self::Running => write!(f, "running"),
            Self::Exited(code) => write!(f, "exited({code})"),
            Self::LaunchFailed => write!(f, "launch-failed"),
        }
    }
}
