//! Error types for the devrt CLI.
//!
//! Commands return `anyhow::Result`; the variants here carry outcomes that
//! `main` turns into a specific process exit code instead of a message.

use thiserror::Error;

/// Outcomes mapped to an exit code.
#[derive(Debug, Error)]
pub enum DevrtError {
    /// A supervised process failed; its exit code is mirrored.
    ///
    /// The failure has already been reported on stderr, so no further
    /// message is printed.
    #[error("process exited with code {code}")]
    ProcessExitCode {
        /// The exit code of the supervised process.
        code: i32,
    },

    /// The user interrupted a running command with Ctrl-C.
    #[error("interrupted")]
    Interrupted,
}

impl DevrtError {
    /// Exit code used for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ProcessExitCode { code } => *code,
            Self::Interrupted => 130,
        }
    }
}
