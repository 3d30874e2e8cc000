#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Supervision of developer processes for devrt.
//!
//! Starts development servers against a specific runtime install, decides
//! from their output when they are ready, recovers from a port that is
//! already taken, and stops whole process trees on request.
//!
//! ## Modules
//!
//! - [`supervisor`]: the registry of supervised projects and their lifecycle
//! - [`launch`]: launch specifications and the Angular and Spring Boot presets
//! - [`readiness`]: readiness patterns and port-conflict signatures
//! - [`port`]: reclaiming a TCP port from whatever listens on it
//! - [`terminate`]: graceful then forced termination of process groups
//! - [`line_buffer`]: reassembling piped output into lines

pub mod errors;
pub mod launch;
pub mod line_buffer;
pub mod port;
pub mod readiness;
pub mod supervisor;
pub mod terminate;

pub use errors::StartError;
pub use launch::LaunchSpec;
pub use port::free_port;
pub use supervisor::{
    OutputStream, ProjectState, RunningProject, StartOutcome, Supervisor, SupervisorConfig,
    SupervisorEvent, SupervisorSink,
};
