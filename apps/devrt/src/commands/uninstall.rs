//! Uninstall command for the devrt CLI.
//!
//! Removes an installed runtime version.
//!
//! ## Usage
//!
//! ```bash
//! devrt uninstall node 18.20.4
//! ```

use anyhow::{Result, bail};
use clap::Args;
use devrt_runtime::RuntimeKind;

use crate::context::GlobalArgs;

/// Arguments for the uninstall command.
#[derive(Args)]
pub struct UninstallArgs {
    /// Runtime kind (node, jdk or maven).
    pub kind: RuntimeKind,
    /// Version to remove.
    pub version: String,
}

/// Executes the uninstall command.
///
/// # Errors
///
/// Returns an error if the version is not installed or its directory cannot
/// be removed.
pub async fn execute(global: &GlobalArgs, args: &UninstallArgs) -> Result<()> {
    let installer = global.installer()?;
    let (kind, version) = (args.kind, &args.version);

    if !installer.uninstall(kind, version).await? {
        bail!("{kind} {version} is not installed.");
    }
    Ok(())
}
