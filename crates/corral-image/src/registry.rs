//! Registry access.
//!
//! [`Registry`] is the seam between the root filesystem builder and the
//! network: the three pull operations a build needs, in the order it needs
//! them. [`HttpRegistry`] implements it against a Docker Registry v2 API.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use corral_common::config::RegistryConfig;
use corral_common::constants::APP_NAME;
use corral_common::error::{CorralError, Result};
use corral_common::interrupt::Interrupt;
use corral_common::types::{AuthToken, LayerDescriptor};
use reqwest::blocking::Client;

/// The pull operations of an image registry.
///
/// `repository` is always the registry path (e.g. `library/redis`).
pub trait Registry {
    /// Obtains an anonymous pull token scoped to `repository`.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Auth` if no usable token is issued.
    fn fetch_token(&self, repository: &str) -> Result<AuthToken>;

    /// Resolves `reference` (tag or digest) to its layers, in apply order.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Manifest` if the manifest cannot be retrieved or decoded.
    fn resolve_layers(
        &self,
        repository: &str,
        reference: &str,
        token: &AuthToken,
    ) -> Result<Vec<LayerDescriptor>>;

    /// Downloads the blob `digest` into `staging_dir` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::Fetch` if the download or the local write fails.
    fn fetch_blob(
        &self,
        repository: &str,
        digest: &str,
        token: &AuthToken,
        staging_dir: &Path,
    ) -> Result<PathBuf>;
}

/// Registry client over blocking HTTP.
///
/// The HTTP client is built on first use, so a run that never pulls never
/// starts its I/O thread. No request carries a timeout; a stalled registry
/// stalls the run until it is interrupted.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: OnceLock<Client>,
    config: RegistryConfig,
    interrupt: Interrupt,
}

impl HttpRegistry {
    /// Creates a client for the registry described by `config`.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            client: OnceLock::new(),
            config,
            interrupt: Interrupt::new(),
        }
    }

    /// Aborts blob downloads once `interrupt` is requested.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CorralError::Config {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        tracing::debug!(
            registry = %self.config.registry_url,
            auth = %self.config.auth_url,
            "registry client ready"
        );
        Ok(self.client.get_or_init(|| client))
    }
}

impl Registry for HttpRegistry {
    fn fetch_token(&self, repository: &str) -> Result<AuthToken> {
        crate::auth::fetch_token(self.client()?, &self.config, repository)
    }

    fn resolve_layers(
        &self,
        repository: &str,
        reference: &str,
        token: &AuthToken,
    ) -> Result<Vec<LayerDescriptor>> {
        crate::manifest::resolve_layers(self.client()?, &self.config, repository, reference, token)
    }

    fn fetch_blob(
        &self,
        repository: &str,
        digest: &str,
        token: &AuthToken,
        staging_dir: &Path,
    ) -> Result<PathBuf> {
        crate::blob::fetch_blob(
            self.client()?,
            &self.config,
            repository,
            digest,
            token,
            staging_dir,
            &self.interrupt,
        )
    }
}
