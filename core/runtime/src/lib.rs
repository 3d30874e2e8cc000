#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Portable runtime acquisition for devrt.
//!
//! Downloads, verifies and unpacks versioned Node.js, JDK and Maven bundles
//! into a private base directory, installs companion tooling into them and
//! reports where their executables live. Nothing is installed system-wide.
//!
//! ## Modules
//!
//! - [`catalog`]: known versions, download URLs and executable layout
//! - [`transfer`]: streaming HTTP download with bounded redirects
//! - [`verify`]: SHA256 verification
//! - [`archive`]: ZIP, tar.gz and tar.xz extraction with root policies
//! - [`installer`]: the install pipeline and Java toolchain assembly
//! - [`discovery`]: Java version discovery from `pom.xml`
//! - [`project_store`]: per-project settings
//! - [`paths`]: base directory resolution and install metadata
//! - [`events`]: progress and log notifications

pub mod archive;
pub mod catalog;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod installer;
pub mod paths;
pub mod platform;
pub mod project_store;
pub mod transfer;
pub mod verify;

pub use catalog::{Catalog, InstalledRuntimeLocation, Mirrors, RuntimeKind};
pub use errors::InstallError;
pub use events::{Event, EventSink};
pub use installer::{InstallOptions, Installer, JavaToolchain, StaleArchivePolicy};
pub use paths::{BaseContext, RuntimePaths};
pub use platform::Platform;
