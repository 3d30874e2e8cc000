//! Free-port command for the devrt CLI.
//!
//! Terminates whatever listens on a TCP port, the same way `start` does
//! before launching a server.

use anyhow::Result;
use clap::Args;

/// Arguments for the free-port command.
#[derive(Args)]
pub struct FreePortArgs {
    /// TCP port to reclaim.
    pub port: u16,
}

/// Executes the free-port command. Never fails: reclamation is best-effort.
#[allow(clippy::unnecessary_wraps)]
pub async fn execute(args: &FreePortArgs) -> Result<()> {
    let port = args.port;
    match devrt_supervisor::free_port(port).await {
        0 => println!("Port {port} is free."),
        n => println!("Terminated {n} process(es) listening on port {port}."),
    }
    Ok(())
}
