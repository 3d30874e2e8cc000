//! Start command for the devrt CLI.
//!
//! Installs the runtime a project needs if necessary, then starts and
//! supervises its development server in the foreground. Output is streamed
//! with a `[project]` prefix. Ctrl-C stops the whole process tree.
//!
//! ## Usage
//!
//! ```bash
//! devrt start angular shop-ui --dir ./shop-ui --port 4200
//! devrt start spring billing --dir ./billing --port 8080
//! devrt start exec docs --dir ./docs --ready "listening on" -- npm run serve
//! ```
//!
//! ## Exit Codes
//!
//! - 0 when the server was stopped with Ctrl-C or exited cleanly
//! - the server's own exit code when it failed
//! - 130 when interrupted before the server became ready

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use devrt_runtime::discovery::{DiscoveredJavaVersion, JavaVersionQuery};
use devrt_runtime::project_store::ProjectConfig;
use devrt_runtime::InstallOptions;
use devrt_supervisor::launch::{self, DEFAULT_ANGULAR_PORT, DEFAULT_SPRING_PORT};
use devrt_supervisor::{LaunchSpec, StartError, StartOutcome, Supervisor, SupervisorConfig};
use tokio::sync::mpsc;

use crate::console;
use crate::context::GlobalArgs;
use crate::errors::DevrtError;

/// Arguments for the start command.
#[derive(Args)]
pub struct StartArgs {
    /// What to start.
    #[command(subcommand)]
    pub target: StartTarget,
}

/// Kinds of project that can be started.
#[derive(Subcommand)]
pub enum StartTarget {
    /// Run `ng serve` on the project's Node.js version.
    Angular(AngularArgs),
    /// Run `mvn spring-boot:run` on the project's JDK.
    Spring(SpringArgs),
    /// Run an arbitrary command under supervision.
    Exec(ExecArgs),
}

/// Arguments for `start angular`.
#[derive(Args)]
pub struct AngularArgs {
    /// Project name.
    pub project: String,
    /// Project directory.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
    /// Port to serve on.
    #[arg(long, default_value_t = DEFAULT_ANGULAR_PORT)]
    pub port: u16,
    /// Node.js version; defaults to the project store, then 20.18.0.
    #[arg(long, value_name = "VERSION")]
    pub node: Option<String>,
}

/// Arguments for `start spring`.
#[derive(Args)]
pub struct SpringArgs {
    /// Project name.
    pub project: String,
    /// Project directory.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
    /// Port to serve on.
    #[arg(long, default_value_t = DEFAULT_SPRING_PORT)]
    pub port: u16,
    /// JDK feature release; defaults to the project store, then pom.xml.
    #[arg(long, value_name = "FEATURE")]
    pub java: Option<String>,
    /// URL of a raw pom.xml, used when there is no local one.
    #[arg(long, value_name = "URL")]
    pub pom_url: Option<String>,
}

/// Arguments for `start exec`.
#[derive(Args)]
pub struct ExecArgs {
    /// Project name.
    pub project: String,
    /// Working directory.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
    /// Port the command listens on; reclaimed before launch.
    #[arg(long)]
    pub port: Option<u16>,
    /// Readiness pattern (regular expression); repeatable. Without one the
    /// command counts as ready once spawned.
    #[arg(long = "ready", value_name = "REGEX")]
    pub ready: Vec<String>,
    /// Command and arguments.
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Executes the start command.
///
/// # Errors
///
/// Returns an error if the runtime cannot be installed or the server fails
/// to start. A server failing with an exit code is reported as
/// [`DevrtError::ProcessExitCode`].
pub async fn execute(global: &GlobalArgs, args: &StartArgs) -> Result<()> {
    let spec = match &args.target {
        StartTarget::Angular(a) => angular_spec(global, a).await?,
        StartTarget::Spring(s) => spring_spec(global, s).await?,
        StartTarget::Exec(e) => exec_spec(global, e)?,
    };
    supervise(spec).await
}

async fn angular_spec(global: &GlobalArgs, args: &AngularArgs) -> Result<LaunchSpec> {
    let config = global.project_config(&args.project)?;
    let version = args
        .node
        .as_deref()
        .unwrap_or_else(|| config.node_version_or_default());

    let installer = global.installer()?;
    let node = installer.ensure_node(version, &InstallOptions::default()).await?;
    let dir = project_dir(&args.dir)?;
    Ok(launch::angular_dev_server(&args.project, &dir, &node, args.port, &config))
}

async fn spring_spec(global: &GlobalArgs, args: &SpringArgs) -> Result<LaunchSpec> {
    let config = global.project_config(&args.project)?;
    let dir = project_dir(&args.dir)?;
    let installer = global.installer()?;
    let options = InstallOptions::default();

    let toolchain = match pinned_java(args, &config) {
        Some(java_version) => {
            println!("Using Java {} (pinned)", java_version.version);
            installer.ensure_java_toolchain_for(java_version, &options).await?
        }
        None => {
            let query = JavaVersionQuery {
                project: Some(dir.clone()),
                pom_url: args.pom_url.clone(),
            };
            installer.ensure_java_toolchain(&query, &options).await?
        }
    };
    Ok(launch::spring_boot(&args.project, &dir, &toolchain, args.port, &config))
}

fn pinned_java(args: &SpringArgs, config: &ProjectConfig) -> Option<DiscoveredJavaVersion> {
    let version = args.java.as_deref().or(config.java_version.as_deref())?;
    Some(DiscoveredJavaVersion::pinned(version))
}

fn exec_spec(global: &GlobalArgs, args: &ExecArgs) -> Result<LaunchSpec> {
    let Some((program, rest)) = args.command.split_first() else {
        bail!("No command given");
    };
    let config = global.project_config(&args.project)?;
    let dir = project_dir(&args.dir)?;

    let mut spec = LaunchSpec::new(&args.project, program, dir)
        .args(rest)
        .ready_when(args.ready.iter().cloned())
        .with_project_env(&config);
    spec.port = args.port;
    Ok(spec)
}

fn project_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        bail!("Project directory not found: {}", dir.display());
    }
    Ok(std::path::absolute(dir)?)
}

/// Starts `spec` and stays in the foreground until it exits or Ctrl-C.
async fn supervise(spec: LaunchSpec) -> Result<()> {
    let project = spec.project.clone();
    let (exit_tx, mut exits) = mpsc::unbounded_channel();
    let supervisor = Supervisor::new(SupervisorConfig::default(), console::supervisor_sink(exit_tx));

    let mut start = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start(spec).await }
    });

    let outcome = tokio::select! {
        joined = &mut start => joined?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("[{project}] interrupted, cancelling start");
            supervisor.cancel(&project).await;
            let _ = start.await;
            return Err(DevrtError::Interrupted.into());
        }
    };

    let running = match outcome {
        Ok(StartOutcome::Ready(running)) => running,
        Ok(StartOutcome::Completed) => {
            eprintln!("[{project}] finished");
            return Ok(());
        }
        Err(StartError::StartFailed {
            exit_code: Some(code),
            ..
        }) if code != 0 => {
            eprintln!("Error: {project} failed to start (exit code {code})");
            return Err(DevrtError::ProcessExitCode { code }.into());
        }
        Err(e) => return Err(e.into()),
    };

    eprintln!("[{project}] running; press Ctrl-C to stop");
    loop {
        tokio::select! {
            exit = exits.recv() => match exit {
                Some((pid, code)) if pid == running.pid => {
                    return match code {
                        Some(0) => Ok(()),
                        Some(code) => Err(DevrtError::ProcessExitCode { code }.into()),
                        None => Err(DevrtError::ProcessExitCode { code: 1 }.into()),
                    };
                }
                Some(_) => {}
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("[{project}] stopping");
                if !supervisor.stop(&project).await {
                    tracing::warn!(project, "process did not confirm exit");
                }
                return Ok(());
            }
        }
    }
}
