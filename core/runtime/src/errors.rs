//! Error types for runtime acquisition.
//!
//! Every stage of the pipeline has its own error enum so callers can tell a
//! network failure from a broken archive from a runtime that installed but is
//! missing its binaries. [`InstallError`] wraps the lower-level errors with the
//! kind, version and platform being installed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::RuntimeKind;
use crate::platform::Platform;

/// Failure while streaming a remote file to disk.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Connection, TLS or body-stream failure.
    #[error("network error while downloading {url}: {source}")]
    Network {
        /// The URL being fetched when the failure happened.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP error {status} for {url}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// The URL that answered with the status.
        url: String,
    },

    /// The redirect chain exceeded the allowed number of hops.
    #[error("too many redirects (more than {limit}) starting at {url}")]
    TooManyRedirects {
        /// The original URL.
        url: String,
        /// The redirect limit.
        limit: u32,
    },

    /// Local file could not be created or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The local path involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Returns the HTTP status if this is an [`TransferError::Http`] error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure while unpacking an archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The archive extension is not one of `.zip`, `.tar.gz`, `.tar.xz`.
    #[error("unsupported archive format: {}", path.display())]
    UnsupportedFormat {
        /// The archive path.
        path: PathBuf,
    },

    /// The archive reader or the filesystem failed mid-extraction.
    #[error("failed to extract {}: {cause}", path.display())]
    ExtractionFailed {
        /// The archive path.
        path: PathBuf,
        /// Human-readable cause.
        cause: String,
    },
}

impl ExtractError {
    /// Creates an [`ExtractError::ExtractionFailed`] from any displayable cause.
    #[must_use]
    pub fn failed(path: impl Into<PathBuf>, cause: impl fmt::Display) -> Self {
        Self::ExtractionFailed {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

/// Identifies which installation an error belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    /// Runtime kind.
    pub kind: RuntimeKind,
    /// Version string as requested.
    pub version: String,
    /// Target platform.
    pub platform: Platform,
}

impl fmt::Display for InstallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.version, self.platform)
    }
}

/// Failure of an `ensure_installed` call.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The host is not one of the supported platforms.
    #[error("unsupported platform: {os} on {arch}")]
    UnsupportedPlatform {
        /// `std::env::consts::OS`.
        os: String,
        /// `std::env::consts::ARCH`.
        arch: String,
    },

    /// The version is in the catalog but has no bundle for this platform.
    #[error("{context} is not available for this platform")]
    NotAvailableForPlatform {
        /// Which installation.
        context: InstallTarget,
    },

    /// The version is not in the catalog.
    #[error("unknown {kind} version: {version}")]
    UnknownVersion {
        /// Runtime kind.
        kind: RuntimeKind,
        /// Requested version.
        version: String,
    },

    /// Downloading the archive failed.
    #[error("failed to download {context}: {source}")]
    Transfer {
        /// Which installation.
        context: InstallTarget,
        /// The transfer failure.
        #[source]
        source: TransferError,
    },

    /// The downloaded archive does not match its published checksum.
    #[error("checksum mismatch for {context}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Which installation.
        context: InstallTarget,
        /// Expected SHA256.
        expected: String,
        /// Computed SHA256.
        actual: String,
    },

    /// Unpacking the archive failed.
    #[error("failed to extract {context}: {source}")]
    ExtractionFailed {
        /// Which installation.
        context: InstallTarget,
        /// Set when the archive was left over from an earlier run; the caller may
        /// delete it and redownload.
        stale_archive: bool,
        /// The extraction failure.
        #[source]
        source: ExtractError,
    },

    /// The companion package could not be installed into the runtime.
    #[error("failed to install {package} (exit code {})", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CompanionToolInstallFailed {
        /// The package spec passed to the package manager.
        package: String,
        /// Exit code of the package manager, if it exited normally.
        exit_code: Option<i32>,
    },

    /// Extraction finished but the expected executables are not there.
    #[error("{context} installed but {} is missing", missing.display())]
    InstalledButMissing {
        /// Which installation.
        context: InstallTarget,
        /// First expected path that was not found.
        missing: PathBuf,
    },

    /// Local filesystem failure outside download and extraction.
    #[error("I/O error: {message}")]
    Io {
        /// What was being done.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    /// Creates a new `Io` error.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns whether the failure came from a stale archive left by an earlier run.
    #[must_use]
    pub fn is_stale_archive(&self) -> bool {
        matches!(
            self,
            Self::ExtractionFailed {
                stale_archive: true,
                ..
            }
        )
    }
}
