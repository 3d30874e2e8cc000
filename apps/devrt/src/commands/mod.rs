//! Command modules for the devrt CLI.
//!
//! ## Runtime Commands
//!
//! - [`versions`] - List runtime versions devrt can install
//! - [`list`] - List installed runtimes
//! - [`install`] - Install runtimes and toolchains
//! - [`uninstall`] - Remove an installed runtime
//! - [`java_version`] - Show the Java version a project needs
//!
//! ## Process Commands
//!
//! - [`start`] - Start and supervise a development server
//! - [`free_port`] - Terminate whatever listens on a port

pub mod free_port;
pub mod install;
pub mod java_version;
pub mod list;
pub mod start;
pub mod uninstall;
pub mod versions;
