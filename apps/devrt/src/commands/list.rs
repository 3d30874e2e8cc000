//! List command for the devrt CLI.
//!
//! Displays installed runtimes grouped by kind, with install age when the
//! install metadata is present.
//!
//! ## Usage
//!
//! ```bash
//! devrt list
//! ```
//!
//! ## Output Format
//!
//! ```text
//! Installed runtimes:
//!
//!   node   18.20.4    (installed today)
//!   jdk    17         (installed 3 days ago)
//!   maven  3.9.9
//! ```

use anyhow::Result;
use devrt_runtime::RuntimeKind;

use crate::context::GlobalArgs;

/// Executes the list command.
///
/// # Errors
///
/// Returns an error if a runtime directory cannot be read.
pub fn execute(global: &GlobalArgs) -> Result<()> {
    let installer = global.installer()?;

    let mut rows = Vec::new();
    for kind in RuntimeKind::ALL {
        for installed in installer.installed(kind)? {
            let age = installed
                .metadata
                .map(|meta| format!("(installed {})", meta.installed_ago()));
            rows.push((kind.to_string(), installed.location.version, age));
        }
    }

    if rows.is_empty() {
        println!("No runtimes installed.");
        println!();
        println!("Run 'devrt install node' or 'devrt install java' to install one.");
        return Ok(());
    }

    println!("Installed runtimes:");
    println!();
    for (kind, version, age) in rows {
        match age {
            Some(age) => println!("  {kind:<6} {version:<10} {age}"),
            None => println!("  {kind:<6} {version}"),
        }
    }

    Ok(())
}
