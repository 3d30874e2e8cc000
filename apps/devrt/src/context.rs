//! Options shared by every command and the objects built from them.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use devrt_runtime::paths::BaseContext;
use devrt_runtime::project_store::{ProjectConfig, ProjectStore};
use devrt_runtime::{Catalog, Installer, Platform, RuntimePaths};

use crate::console;

/// Global options.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Keep runtimes next to the devrt executable instead of in ./.devrt.
    #[arg(long, global = true)]
    pub packaged: bool,

    /// Base directory for runtimes and the project store.
    ///
    /// Takes precedence over DEVRT_HOME and --packaged.
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,
}

impl GlobalArgs {
    /// Resolves the base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no base directory can be determined.
    pub fn paths(&self) -> Result<RuntimePaths> {
        if let Some(home) = &self.home {
            return Ok(RuntimePaths::with_root(home.clone()));
        }
        let context = if self.packaged {
            BaseContext::Packaged
        } else {
            BaseContext::Development
        };
        Ok(RuntimePaths::resolve(context)?)
    }

    /// Builds an installer for this host that prints its events.
    ///
    /// # Errors
    ///
    /// Returns an error on an unsupported platform or if no base directory
    /// can be determined.
    pub fn installer(&self) -> Result<Installer> {
        let platform = Platform::detect()?;
        let paths = self.paths()?;
        tracing::debug!(root = %paths.root.display(), %platform, "runtime base directory");
        Ok(Installer::new(
            Catalog::from_env(),
            paths,
            platform,
            console::install_sink(),
        ))
    }

    /// Settings of a project from the project store.
    ///
    /// # Errors
    ///
    /// Returns an error if no base directory can be determined. A missing or
    /// unreadable store yields default settings.
    pub fn project_config(&self, project: &str) -> Result<ProjectConfig> {
        let paths = self.paths()?;
        Ok(ProjectStore::load(&paths.project_store_path()).get(project))
    }
}
