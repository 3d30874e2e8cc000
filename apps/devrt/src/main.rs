#![warn(clippy::pedantic)]

//! # devrt
//!
//! The `devrt` command installs portable language runtimes (Node.js, JDKs,
//! Maven) into a private directory and runs development servers against a
//! specific runtime version per project, without touching the system.
//!
//! ## Subcommands
//!
//! - `versions` - List installable runtime versions
//! - `list` - List installed runtimes
//! - `install` - Install a runtime or the Java toolchain of a project
//! - `uninstall` - Remove an installed runtime
//! - `start` - Start and supervise a development server
//! - `free-port` - Terminate whatever listens on a port
//! - `java-version` - Show the Java version a project needs
//!
//! ## Examples
//!
//! Install the default Node.js with its Angular CLI:
//! ```bash
//! devrt install node
//! ```
//!
//! Serve an Angular project on its pinned Node.js:
//! ```bash
//! devrt start angular shop-ui --dir ./shop-ui
//! ```

mod commands;
mod console;
mod context;
mod errors;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{free_port, install, java_version, list, start, uninstall, versions};
use context::GlobalArgs;
use errors::DevrtError;
use tracing_subscriber::EnvFilter;

/// Portable developer runtimes and supervised dev servers.
#[derive(Parser)]
#[command(
    name = "devrt",
    author,
    version,
    about = "Portable developer runtimes and supervised dev servers",
    after_help = "\
BASE DIRECTORY:
    Runtimes and projects.toml live in the first of:
    1. --home DIR
    2. DEVRT_HOME environment variable
    3. <exe dir>/runtimes with --packaged
    4. ./.devrt

ENVIRONMENT VARIABLES:
    DEVRT_HOME              Base directory
    DEVRT_NODE_MIRROR       Node.js mirror (default: https://nodejs.org/dist)
    DEVRT_JDK_MIRROR        Adoptium API (default: https://api.adoptium.net)
    DEVRT_MAVEN_MIRROR      Apache mirror (default: https://archive.apache.org/dist)
    RUST_LOG                Diagnostic log filter (default: warn)"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the devrt CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// List runtime versions devrt can install.
    ///
    /// Shows each version with its companion tool and marks the installed
    /// ones and those without a bundle for this platform.
    Versions(versions::VersionsArgs),

    /// List installed runtimes.
    List,

    /// Install a runtime.
    ///
    /// Downloads, verifies and extracts the runtime, then installs its
    /// companion tool. Installed versions are left untouched.
    Install(install::InstallArgs),

    /// Remove an installed runtime.
    Uninstall(uninstall::UninstallArgs),

    /// Start and supervise a development server.
    ///
    /// Installs the runtime if needed, frees the port, and streams the
    /// server's output until it exits or Ctrl-C is pressed.
    Start(start::StartArgs),

    /// Terminate whatever listens on a TCP port.
    FreePort(free_port::FreePortArgs),

    /// Show the Java version a Maven project needs.
    JavaVersion(java_version::JavaVersionArgs),
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Diagnostics go to stderr through `RUST_LOG`. User-facing narration is
/// printed by the event sinks, so the default filter stays quiet.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Handles an error and returns the appropriate exit code.
///
/// [`DevrtError`] outcomes have already been reported and only set the exit
/// code. Everything else is printed and exits with 1.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(outcome) = e.downcast_ref::<DevrtError>() {
        return outcome.exit_code();
    }
    eprintln!("Error: {e:#}");
    1
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let global = &cli.global;

    match cli.command {
        Commands::Versions(args) => versions::execute(global, &args),
        Commands::List => list::execute(global),
        Commands::Install(args) => install::execute(global, &args).await,
        Commands::Uninstall(args) => uninstall::execute(global, &args).await,
        Commands::Start(args) => start::execute(global, &args).await,
        Commands::FreePort(args) => free_port::execute(&args).await,
        Commands::JavaVersion(args) => java_version::execute(&args).await,
    }
}
