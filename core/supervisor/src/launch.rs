//! What to start and how to recognise that it is up.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use devrt_runtime::catalog::InstalledRuntimeLocation;
use devrt_runtime::installer::JavaToolchain;
use devrt_runtime::paths::search_path_with;
use devrt_runtime::project_store::ProjectConfig;

use crate::readiness::{ANGULAR_READY_PATTERNS, SPRING_READY_PATTERNS};

/// Default port of `ng serve`.
pub const DEFAULT_ANGULAR_PORT: u16 = 4200;

/// Default port of a Spring Boot application.
pub const DEFAULT_SPRING_PORT: u16 = 8080;

/// A process to supervise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Project name; the supervisor's registry key.
    pub project: String,
    /// Program to run.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<OsString>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<OsString, OsString>,
    /// The TCP port the process will listen on, reclaimed before each launch.
    pub port: Option<u16>,
    /// Runtime version reported for the running project.
    pub runtime_version: Option<String>,
    /// Readiness patterns; empty means ready as soon as spawned.
    pub readiness: Vec<String>,
}

impl LaunchSpec {
    /// A spec running `program` in `cwd` with no arguments, port or patterns.
    pub fn new(project: impl Into<String>, program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            port: None,
            runtime_version: None,
            readiness: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn ready_when<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readiness.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Applies the project's environment overrides. They win over anything
    /// the preset set.
    #[must_use]
    pub fn with_project_env(mut self, config: &ProjectConfig) -> Self {
        for (key, value) in &config.env {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Display form of the command line, for narration.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `ng serve` of an Angular workspace on a specific Node.js install.
///
/// Uses the Angular CLI installed into that Node.js runtime; falls back to
/// `ng` on the search path if the runtime has none.
#[must_use]
pub fn angular_dev_server(
    project: &str,
    dir: &Path,
    node: &InstalledRuntimeLocation,
    port: u16,
    config: &ProjectConfig,
) -> LaunchSpec {
    let program = node.tool_path.clone().unwrap_or_else(|| PathBuf::from("ng"));
    LaunchSpec::new(project, program, dir)
        .args(["serve", "--port", &port.to_string()])
        .env("PATH", search_path_with(&[&node.bin_dir]))
        .env("NG_CLI_ANALYTICS", "false")
        .port(port)
        .runtime_version(&node.version)
        .ready_when(ANGULAR_READY_PATTERNS.iter().copied())
        .with_project_env(config)
}

/// `mvn spring-boot:run` of a Spring Boot project on a JDK and Maven install.
#[must_use]
pub fn spring_boot(
    project: &str,
    dir: &Path,
    toolchain: &JavaToolchain,
    port: u16,
    config: &ProjectConfig,
) -> LaunchSpec {
    LaunchSpec::new(project, &toolchain.maven.executable_path, dir)
        .args([
            "spring-boot:run".to_string(),
            format!("-Dspring-boot.run.arguments=--server.port={port}"),
        ])
        .env("JAVA_HOME", &toolchain.jdk.root_dir)
        .env(
            "PATH",
            search_path_with(&[&toolchain.jdk.bin_dir, &toolchain.maven.bin_dir]),
        )
        .port(port)
        .runtime_version(&toolchain.jdk.version)
        .ready_when(SPRING_READY_PATTERNS.iter().copied())
        .with_project_env(config)
}
