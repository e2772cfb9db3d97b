//! Global configuration model for the corral runtime.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Where and how to talk to the image registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Token endpoint URL.
    pub auth_url: String,
    /// `service` parameter for token requests.
    pub auth_service: String,
    /// Base URL of the registry v2 API (without the `/v2` suffix).
    pub registry_url: String,
}

impl RegistryConfig {
    /// Returns the manifest URL for `repository_path` at `reference`.
    #[must_use]
    pub fn manifest_url(&self, repository_path: &str, reference: &str) -> String {
        format!(
            "{}/v2/{repository_path}/manifests/{reference}",
            self.registry_url.trim_end_matches('/')
        )
    }

    /// Returns the blob URL for `digest` in `repository_path`.
    #[must_use]
    pub fn blob_url(&self, repository_path: &str, digest: &str) -> String {
        format!(
            "{}/v2/{repository_path}/blobs/{digest}",
            self.registry_url.trim_end_matches('/')
        )
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth_url: constants::DEFAULT_AUTH_URL.into(),
            auth_service: constants::DEFAULT_AUTH_SERVICE.into(),
            registry_url: constants::DEFAULT_REGISTRY_URL.into(),
        }
    }
}

/// Root configuration for one corral invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorralConfig {
    /// Registry endpoints.
    pub registry: RegistryConfig,
    /// Directory under which ephemeral roots and layer staging areas are created.
    pub scratch_dir: PathBuf,
}

impl Default for CorralConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}
