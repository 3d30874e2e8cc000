//! Versions command for the devrt CLI.
//!
//! Lists the catalog: every version devrt can install, its companion tool,
//! and whether it is installed or unavailable on this platform.
//!
//! ## Usage
//!
//! ```bash
//! devrt versions          # All runtime kinds
//! devrt versions node     # Node.js only
//! ```
//!
//! ## Output Format
//!
//! ```text
//! node
//!   16.20.2    @angular/cli@15
//!   20.18.0    @angular/cli@18    (installed)
//! jdk
//!   8          (not available for macos-arm64)
//! ```

use anyhow::Result;
use clap::Args;
use devrt_runtime::RuntimeKind;

use crate::context::GlobalArgs;

/// Arguments for the versions command.
#[derive(Args)]
pub struct VersionsArgs {
    /// Only list this runtime kind (node, jdk or maven).
    pub kind: Option<RuntimeKind>,
}

/// Executes the versions command.
///
/// # Errors
///
/// Returns an error on an unsupported platform or if no base directory can
/// be determined.
pub fn execute(global: &GlobalArgs, args: &VersionsArgs) -> Result<()> {
    let installer = global.installer()?;
    let catalog = installer.catalog();
    let platform = installer.platform();

    let kinds: Vec<RuntimeKind> = match args.kind {
        Some(kind) => vec![kind],
        None => RuntimeKind::ALL.to_vec(),
    };

    for kind in kinds {
        println!("{kind}");
        for spec in catalog.available(kind) {
            let mut line = format!("  {:<10}", spec.version);
            if let Some(tool) = &spec.companion_tool {
                line.push_str(&format!(" {tool:<18}"));
            }
            if catalog.resolve_download_url(kind, &spec.version, platform).is_err() {
                line.push_str(&format!(" (not available for {platform})"));
            } else if installer.locate(kind, &spec.version).is_some() {
                line.push_str(" (installed)");
            }
            println!("{}", line.trim_end());
        }
    }

    Ok(())
}
