//! Layer blob download.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use corral_common::config::RegistryConfig;
use corral_common::error::{CorralError, Result};
use corral_common::interrupt::Interrupt;
use corral_common::types::AuthToken;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;

use crate::hash::verify_digest;
use crate::storage::archive_file_name;

/// Streams the blob `digest` of `repository` into `staging_dir`.
///
/// The body is written to `<staging_dir>/<hex>.tar.gz` as it arrives and
/// then checked against `digest`. The body is read in chunks and the copy
/// stops at the first chunk after `interrupt` is requested. A partial file
/// left by a failure is not removed here; it goes away with the staging
/// directory.
///
/// # Errors
///
/// Returns `CorralError::Auth` if `token` belongs to another repository,
/// `CorralError::Interrupted` if the copy was stopped, and
/// `CorralError::Fetch` on transport failure, a non-2xx status, a local
/// write failure, or a digest mismatch.
pub fn fetch_blob(
    client: &Client,
    config: &RegistryConfig,
    repository: &str,
    digest: &str,
    token: &AuthToken,
    staging_dir: &Path,
    interrupt: &Interrupt,
) -> Result<PathBuf> {
    token.ensure_scope(repository)?;
    let fail = |message: String| CorralError::Fetch {
        digest: digest.to_string(),
        message,
    };
    let destination = staging_dir.join(archive_file_name(digest)?);
    let url = config.blob_url(repository, digest);
    tracing::info!(repository, digest, "fetching layer");

    let response = client
        .get(&url)
        .header(AUTHORIZATION, token.bearer())
        .send()
        .map_err(|e| fail(format!("blob request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("blob endpoint returned HTTP {status}")));
    }

    let mut file = File::create(&destination)
        .map_err(|e| fail(format!("cannot create {}: {e}", destination.display())))?;
    let mut body = Interruptible {
        inner: response,
        interrupt,
    };
    let written = match io::copy(&mut body, &mut file) {
        Ok(written) => written,
        Err(_) if interrupt.is_requested() => return Err(CorralError::Interrupted),
        Err(e) => return Err(fail(format!("writing {} failed: {e}", destination.display()))),
    };
    drop(file);

    verify_digest(&destination, digest)?;
    tracing::debug!(digest, bytes = written, path = %destination.display(), "layer fetched");
    Ok(destination)
}

/// Reader that fails once an interrupt has been requested.
struct Interruptible<'a, R> {
    inner: R,
    interrupt: &'a Interrupt,
}

impl<R: Read> Read for Interruptible<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt.is_requested() {
            return Err(io::Error::other("download interrupted"));
        }
        self.inner.read(buf)
    }
}
