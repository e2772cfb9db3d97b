//! Root filesystem assembly from an image reference.
//!
//! Layers are fetched and applied strictly one after another in manifest
//! order, and each archive is deleted as soon as it has been applied. The
//! first error aborts the build; whatever was already written to the root
//! stays there for the caller to discard. An interrupt is honoured before
//! the first request and around every layer.

use std::path::{Path, PathBuf};

use corral_common::error::Result;
use corral_common::interrupt::Interrupt;
use corral_common::types::ImageReference;

use crate::layer::apply_layer;
use crate::registry::Registry;
use crate::storage::StagingArea;

/// One layer as it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltLayer {
    /// Content digest from the manifest.
    pub digest: String,
    /// Size of the downloaded archive in bytes.
    pub size_bytes: u64,
}

/// Report of a completed build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    /// The reference that was built.
    pub reference: ImageReference,
    /// Applied layers, lowest first.
    pub layers: Vec<BuiltLayer>,
}

/// Populates root directories from images served by a [`Registry`].
#[derive(Debug)]
pub struct RootfsBuilder<R> {
    registry: R,
    scratch_dir: PathBuf,
    interrupt: Interrupt,
}

impl<R: Registry> RootfsBuilder<R> {
    /// Creates a builder that stages archives under `scratch_dir`.
    pub fn new(registry: R, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            scratch_dir: scratch_dir.into(),
            interrupt: Interrupt::new(),
        }
    }

    /// Stops builds once `interrupt` is requested.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Returns the registry this builder pulls from.
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Parses `reference` and builds it into `root`.
    ///
    /// # Errors
    ///
    /// Returns `CorralError::InvalidReference` for an unparsable reference,
    /// otherwise the first error from [`Self::build_reference`].
    pub fn build(&self, reference: &str, root: &Path) -> Result<BuiltImage> {
        let reference = ImageReference::parse(reference)?;
        self.build_reference(&reference, root)
    }

    /// Builds `reference` into `root`.
    ///
    /// # Errors
    ///
    /// Returns the first `Auth`, `Manifest`, `Fetch`, `Extract`,
    /// `Filesystem` or `Interrupted` error encountered. No registry call is
    /// made after it.
    pub fn build_reference(&self, reference: &ImageReference, root: &Path) -> Result<BuiltImage> {
        let repository = reference.repository_path();
        let selector = reference.selector.as_str();
        tracing::info!(
            image = %reference,
            root = %root.display(),
            "building root filesystem"
        );

        self.interrupt.check()?;
        let token = self.registry.fetch_token(&repository)?;
        let descriptors = self.registry.resolve_layers(&repository, selector, &token)?;
        let staging = StagingArea::create(&self.scratch_dir)?;

        let total = descriptors.len();
        let mut layers = Vec::with_capacity(total);
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            self.interrupt.check()?;
            tracing::info!(
                layer = index + 1,
                of = total,
                digest = %descriptor.digest,
                size = ?descriptor.size,
                media_type = ?descriptor.media_type,
                "pulling layer"
            );
            let archive =
                self.registry
                    .fetch_blob(&repository, &descriptor.digest, &token, staging.path())?;
            self.interrupt.check()?;
            let applied = apply_layer(&archive, root)?;
            staging.discard(&archive)?;
            layers.push(BuiltLayer {
                digest: descriptor.digest,
                size_bytes: applied.size_bytes,
            });
        }

        tracing::info!(image = %reference, layers = layers.len(), "root filesystem built");
        Ok(BuiltImage {
            reference: reference.clone(),
            layers,
        })
    }
}
