//! Checksum verification for downloaded runtime archives.
//!
//! Only used when the catalog entry carries a published SHA256; most vendor
//! bundles are fetched over TLS without one.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failure of [`verify_checksum`].
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The file hashed to something else.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Mismatch {
        /// Expected hash, lowercase hex.
        expected: String,
        /// Computed hash, lowercase hex.
        actual: String,
    },

    /// The file could not be read.
    #[error("failed to read file for checksum: {0}")]
    Io(#[from] std::io::Error),
}

/// Verifies that a file matches the expected SHA256 checksum.
///
/// The comparison ignores the case of `expected`.
///
/// # Errors
///
/// Returns [`VerifyError::Io`] if the file cannot be read and
/// [`VerifyError::Mismatch`] if the hash differs.
pub fn verify_checksum(file_path: &Path, expected: &str) -> Result<(), VerifyError> {
    let actual = compute_sha256(file_path)?;
    let expected = expected.trim().to_ascii_lowercase();

    if actual != expected {
        return Err(VerifyError::Mismatch { expected, actual });
    }

    Ok(())
}

/// Computes the SHA256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(file_path)?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
