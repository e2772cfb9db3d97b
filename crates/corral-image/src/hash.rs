//! SHA-256 content verification.
//!
//! Validates that a downloaded blob matches the digest it was requested by.

use std::path::Path;

use corral_common::constants::{SHA256_HEX_LENGTH, SHA256_PREFIX};
use corral_common::error::{CorralError, Result};
use sha2::{Digest, Sha256};

/// Computes the hex-encoded SHA-256 hash of a file.
///
/// # Errors
///
/// Returns `CorralError::Filesystem` if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let mut file = std::fs::File::open(path).map_err(|e| CorralError::filesystem(path, e))?;
    let mut hasher = Sha256::new();
    let _ = std::io::copy(&mut file, &mut hasher).map_err(|e| CorralError::filesystem(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Checks a file against a content digest of the form `<algorithm>:<hex>`.
///
/// Only `sha256` digests are verified; any other algorithm is accepted
/// unchecked.
///
/// # Errors
///
/// Returns `CorralError::Fetch` if the file does not match the digest, or
/// `CorralError::Filesystem` if it cannot be read.
pub fn verify_digest(path: &Path, digest: &str) -> Result<()> {
    let Some((algorithm, expected)) = digest.split_once(':') else {
        return Err(CorralError::Fetch {
            digest: digest.to_string(),
            message: "digest has no algorithm prefix".into(),
        });
    };
    if algorithm != SHA256_PREFIX {
        tracing::debug!(digest, algorithm, "skipping verification of non-sha256 digest");
        return Ok(());
    }
    if expected.len() != SHA256_HEX_LENGTH {
        return Err(CorralError::Fetch {
            digest: digest.to_string(),
            message: format!("sha256 digest must be {SHA256_HEX_LENGTH} hex characters"),
        });
    }

    let actual = hash_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!(digest, "digest verified");
        Ok(())
    } else {
        Err(CorralError::Fetch {
            digest: digest.to_string(),
            message: format!("content hash mismatch: got sha256:{actual}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello")
    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn hash_file_matches_known_vector() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, b"hello").expect("write");
        assert_eq!(hash_file(&path).expect("hash"), HELLO);
    }

    #[test]
    fn verify_accepts_matching_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, b"hello").expect("write");
        verify_digest(&path, &format!("sha256:{HELLO}")).expect("digest should match");
    }

    #[test]
    fn verify_rejects_tampered_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, b"hellO").expect("write");
        let result = verify_digest(&path, &format!("sha256:{HELLO}"));
        assert!(matches!(result, Err(CorralError::Fetch { .. })));
    }

    #[test]
    fn verify_skips_other_algorithms() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, b"anything").expect("write");
        verify_digest(&path, "sha512:deadbeef").expect("unverified algorithm is accepted");
    }

    #[test]
    fn verify_rejects_short_sha256() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, b"hello").expect("write");
        assert!(verify_digest(&path, "sha256:abc").is_err());
    }
}
