//! Install command for the devrt CLI.
//!
//! Downloads and installs runtimes into the base directory. Installing an
//! installed version is a no-op that needs no network access.
//!
//! ## Usage
//!
//! ```bash
//! devrt install node                  # Default Node.js with its Angular CLI
//! devrt install node 18.20.4
//! devrt install jdk 21
//! devrt install maven
//! devrt install java --project ./billing
//! devrt install custom jdk 21-corp https://mirror.corp/jdk21.tar.gz --sha256 <hex>
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use devrt_runtime::catalog::{
    ArchiveKind, DEFAULT_NODE_VERSION, MAVEN_VERSION, RuntimeVersionSpec,
};
use devrt_runtime::discovery::JavaVersionQuery;
use devrt_runtime::{InstallOptions, InstalledRuntimeLocation, RuntimeKind, StaleArchivePolicy};

use crate::context::GlobalArgs;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// What to install.
    #[command(subcommand)]
    pub target: InstallTarget,

    /// Fail instead of redownloading when a previously downloaded archive
    /// cannot be extracted.
    #[arg(long, global = true)]
    pub fail_on_stale_archive: bool,

    /// Do not install the companion tool (the Angular CLI for Node.js).
    #[arg(long, global = true)]
    pub skip_companion: bool,
}

/// Installable targets.
#[derive(Subcommand)]
pub enum InstallTarget {
    /// Install a Node.js version and its paired Angular CLI.
    Node {
        /// Node.js version.
        #[arg(default_value = DEFAULT_NODE_VERSION)]
        version: String,
    },

    /// Install a JDK feature release (8, 11, 17 or 21).
    Jdk {
        /// Feature release.
        feature: String,
    },

    /// Install Maven.
    Maven,

    /// Install the JDK a Maven project needs, plus Maven.
    ///
    /// The version is read from pom.xml (java.version, then
    /// maven.compiler.release, then maven.compiler.source) and defaults to 17.
    Java {
        /// Project directory or pom.xml path.
        #[arg(long, value_name = "PATH")]
        project: Option<PathBuf>,

        /// URL of a raw pom.xml, used when there is no local one.
        #[arg(long, value_name = "URL")]
        pom_url: Option<String>,
    },

    /// Install an ad hoc runtime from a URL.
    Custom {
        /// Runtime kind (node, jdk or maven).
        kind: RuntimeKind,
        /// Version label to install under.
        version: String,
        /// Archive URL.
        url: String,
        /// Archive format (zip, tar.gz, tar.xz); inferred from the URL when
        /// omitted.
        #[arg(long, value_name = "FORMAT")]
        archive: Option<ArchiveKind>,
        /// Expected SHA256 of the archive.
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
    },
}

impl InstallArgs {
    fn options(&self) -> InstallOptions {
        InstallOptions {
            stale_archive: if self.fail_on_stale_archive {
                StaleArchivePolicy::Fail
            } else {
                StaleArchivePolicy::Redownload
            },
            skip_companion_tool: self.skip_companion,
        }
    }
}

/// Executes the install command.
///
/// # Errors
///
/// Returns an error if the version is unknown or unavailable on this
/// platform, or if download, verification, extraction or companion tool
/// installation fails.
pub async fn execute(global: &GlobalArgs, args: &InstallArgs) -> Result<()> {
    let mut installer = global.installer()?;
    let options = args.options();

    match &args.target {
        InstallTarget::Node { version } => {
            let location = installer.ensure_node(version, &options).await?;
            report(&location);
        }
        InstallTarget::Jdk { feature } => {
            let location = installer
                .ensure_installed(RuntimeKind::Jdk, feature, &options)
                .await?;
            report(&location);
        }
        InstallTarget::Maven => {
            let location = installer
                .ensure_installed(RuntimeKind::Maven, MAVEN_VERSION, &options)
                .await?;
            report(&location);
        }
        InstallTarget::Java { project, pom_url } => {
            let query = JavaVersionQuery {
                project: project.clone(),
                pom_url: pom_url.clone(),
            };
            let toolchain = installer.ensure_java_toolchain(&query, &options).await?;
            report(&toolchain.jdk);
            report(&toolchain.maven);
        }
        InstallTarget::Custom {
            kind,
            version,
            url,
            archive,
            sha256,
        } => {
            let archive = match archive {
                Some(archive) => *archive,
                None => archive_from_url(url)?,
            };
            let mut spec = RuntimeVersionSpec::custom(*kind, version, url, archive);
            if let Some(sha256) = sha256 {
                spec = spec.with_sha256(sha256);
            }
            installer.register(spec);
            let location = installer
                .ensure_installed(*kind, version, &options)
                .await
                .with_context(|| format!("Failed to install custom {kind} {version}"))?;
            report(&location);
        }
    }

    Ok(())
}

fn archive_from_url(url: &str) -> Result<ArchiveKind> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match ArchiveKind::from_path(Path::new(path)) {
        Some(archive) => Ok(archive),
        None => bail!("Cannot tell the archive format of {url}; pass --archive"),
    }
}

fn report(location: &InstalledRuntimeLocation) {
    println!(
        "{} {} is ready at {}",
        location.kind,
        location.version,
        location.root_dir.display()
    );
}
