//! Error types of the process supervisor.

use thiserror::Error;

/// Why a start attempt did not produce a ready process.
#[derive(Debug, Error)]
pub enum StartError {
    /// The project was cancelled while starting.
    #[error("start of {project} was cancelled")]
    Cancelled {
        /// Project name.
        project: String,
    },

    /// The process exited with a failure before it became ready.
    #[error("{project} exited before becoming ready (exit code {})", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    StartFailed {
        /// Project name.
        project: String,
        /// Exit code, `None` if the process was killed by a signal.
        exit_code: Option<i32>,
    },

    /// The port stayed occupied through every retry.
    #[error("{project} could not bind {}: address still in use after {attempts} attempts", port.map_or_else(|| "its port".to_string(), |p| format!("port {p}")))]
    PortConflict {
        /// Project name.
        project: String,
        /// The port the project was started on, if known.
        port: Option<u16>,
        /// Number of launches made.
        attempts: u32,
    },

    /// The program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program path as given.
        program: String,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },

    /// A readiness pattern is not a valid regular expression.
    #[error("invalid readiness pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex compile error.
        #[source]
        source: regex::Error,
    },
}

impl StartError {
    /// Process exit code to mirror for a failed start.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::StartFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_failed_displays_code() {
        let err = StartError::StartFailed {
            project: "shop-ui".to_string(),
            exit_code: Some(3),
        };
        assert_eq!(
            err.to_string(),
            "shop-ui exited before becoming ready (exit code 3)"
        );
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn port_conflict_mentions_port() {
        let err = StartError::PortConflict {
            project: "billing".to_string(),
            port: Some(8080),
            attempts: 2,
        };
        assert_eq!(
            err.to_string(),
            "billing could not bind port 8080: address still in use after 2 attempts"
        );
        assert_eq!(err.exit_code(), None);
    }
}
