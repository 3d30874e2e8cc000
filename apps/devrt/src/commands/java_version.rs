//! Java-version command for the devrt CLI.
//!
//! Shows which JDK feature release a Maven project needs, and where that
//! answer came from.
//!
//! ## Usage
//!
//! ```bash
//! devrt java-version ./billing
//! devrt java-version --pom-url https://git.example/raw/billing/pom.xml
//! ```
//!
//! ## Output Format
//!
//! ```text
//! 21 (java.version in ./billing/pom.xml)
//! 17 (default)
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use devrt_runtime::discovery::{JavaVersionQuery, VersionSource, discover_java_version};

/// Arguments for the java-version command.
#[derive(Args)]
pub struct JavaVersionArgs {
    /// Project directory or pom.xml path.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// URL of a raw pom.xml, used when there is no local one.
    #[arg(long, value_name = "URL")]
    pub pom_url: Option<String>,
}

/// Executes the java-version command. Discovery falls back to a default
/// rather than failing.
#[allow(clippy::unnecessary_wraps)]
pub async fn execute(args: &JavaVersionArgs) -> Result<()> {
    let query = JavaVersionQuery {
        project: Some(args.path.clone()),
        pom_url: args.pom_url.clone(),
    };
    let discovered = discover_java_version(&query).await;

    let origin = match (&discovered.source, discovered.rule) {
        (VersionSource::Local(pom), Some(rule)) => format!("{rule} in {}", pom.display()),
        (VersionSource::Remote(url), Some(rule)) => format!("{rule} in {url}"),
        _ => "default".to_string(),
    };
    println!("{} ({origin})", discovered.version);
    Ok(())
}
