//! Runtime installation pipeline.
//!
//! [`Installer::ensure_installed`] turns a `(kind, version)` pair into a usable
//! runtime directory:
//!
//! ```text
//! CheckInstalled ──installed──────────────────────────────────────────────▶ Done
//!       │
//!       ▼
//!   Download ─▶ VerifyChecksum ─▶ Extract ─▶ InstallCompanionTool ─▶ VerifyInstalled ─▶ Done
//!                                    │                                     │
//!                                    └──────────── Cleanup (archive) ◀─────┘
//! ```
//!
//! An archive left in `downloads/` by an interrupted run is extracted before
//! anything is downloaded. If that fails, [`StaleArchivePolicy`] decides
//! between a fresh download and surfacing the error.
//!
//! ## Concurrency
//!
//! Calls for the same `(kind, version)` within one process are serialised by
//! a per-version async lock; the second caller finds the runtime installed and
//! returns without touching the network. Separate processes installing the
//! same version at the same time are not coordinated.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;

use crate::archive;
use crate::catalog::{
    Catalog, DEFAULT_JAVA_VERSION, InstalledRuntimeLocation, MAVEN_VERSION, RuntimeKind,
    RuntimeVersionSpec,
};
use crate::discovery::{DiscoveredJavaVersion, JavaVersionQuery, discover_java_version};
use crate::errors::{InstallError, InstallTarget};
use crate::events::{Event, EventSink};
use crate::paths::{InstallMetadata, RuntimePaths, search_path_with};
use crate::platform::Platform;
use crate::transfer::{self, TransferCallback, TransferEvent, format_bytes, format_speed};
use crate::verify::{self, VerifyError};

/// What to do when an archive left by an earlier run fails to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleArchivePolicy {
    /// Delete the archive and the install directory, then download again.
    #[default]
    Redownload,
    /// Report [`InstallError::ExtractionFailed`] with `stale_archive` set.
    Fail,
}

/// Per-call installation options.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Handling of a leftover archive that does not extract.
    pub stale_archive: StaleArchivePolicy,
    /// Skip the companion tool even if the version declares one.
    pub skip_companion_tool: bool,
}

/// A JDK plus Maven, ready to build a project.
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    /// The JDK.
    pub jdk: InstalledRuntimeLocation,
    /// Maven.
    pub maven: InstalledRuntimeLocation,
    /// How the JDK version was chosen.
    pub java_version: DiscoveredJavaVersion,
}

/// An installed runtime found on disk.
#[derive(Debug, Clone)]
pub struct InstalledRuntime {
    /// Where it lives.
    pub location: InstalledRuntimeLocation,
    /// Install record, absent for runtimes installed by older builds or by hand.
    pub metadata: Option<InstallMetadata>,
}

type LockMap = HashMap<(RuntimeKind, String), Arc<Mutex<()>>>;

/// Installs runtimes into a base directory for one platform.
pub struct Installer {
    catalog: Catalog,
    paths: RuntimePaths,
    platform: Platform,
    events: EventSink,
    locks: Mutex<LockMap>,
}

impl Installer {
    /// Creates an installer.
    #[must_use]
    pub fn new(catalog: Catalog, paths: RuntimePaths, platform: Platform, events: EventSink) -> Self {
        Self {
            catalog,
            paths,
            platform,
            events,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The catalog versions are resolved against.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The base directory layout.
    #[must_use]
    pub fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    /// The platform bundles are chosen for.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Adds an ad hoc version to the catalog.
    pub fn register(&mut self, spec: RuntimeVersionSpec) {
        self.catalog.register(spec);
    }

    fn target(&self, kind: RuntimeKind, version: &str) -> InstallTarget {
        InstallTarget {
            kind,
            version: version.to_string(),
            platform: self.platform,
        }
    }

    async fn version_lock(&self, kind: RuntimeKind, version: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry((kind, version.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Installed location of a version, if it is installed.
    #[must_use]
    pub fn locate(&self, kind: RuntimeKind, version: &str) -> Option<InstalledRuntimeLocation> {
        self.catalog
            .locate_installed(kind, version, self.platform, &self.paths)
    }

    /// Makes sure a runtime version is installed and returns its location.
    ///
    /// Returns immediately, without network access, if the version is already
    /// installed. A runtime whose companion tool is missing only gets the tool
    /// installed.
    ///
    /// # Errors
    ///
    /// See [`InstallError`]; every variant except `UnsupportedPlatform` can be
    /// returned.
    pub async fn ensure_installed(
        &self,
        kind: RuntimeKind,
        version: &str,
        options: &InstallOptions,
    ) -> Result<InstalledRuntimeLocation, InstallError> {
        let lock = self.version_lock(kind, version).await;
        let _guard = lock.lock().await;

        let target = self.target(kind, version);
        let companion = if options.skip_companion_tool {
            None
        } else {
            self.catalog.companion_tool(kind, version).map(str::to_string)
        };

        if let Some(location) = self.locate(kind, version) {
            tracing::debug!(%target, root = %location.root_dir.display(), "already installed");
            if let Some(package) = &companion
                && location.tool_path.as_ref().is_some_and(|tool| !tool.is_file())
            {
                self.install_companion_tool(&location, package).await?;
                return self.verify_installed(&target, location, companion.is_some());
            }
            return Ok(location);
        }

        let download = self
            .catalog
            .resolve_download_url(kind, version, self.platform)?
            .clone();
        let spec = self
            .catalog
            .get(kind, version)
            .ok_or_else(|| InstallError::UnknownVersion {
                kind,
                version: version.to_string(),
            })?;

        self.paths.ensure_directories()?;
        let archive_path = self
            .paths
            .download_path(&spec.archive_file_name(self.platform, download.archive));
        let install_dir = self.paths.install_dir(kind, version);

        let mut extracted = false;
        if archive_path.is_file() {
            self.emit(Event::info(format!(
                "Reusing downloaded archive {}",
                archive_path.display()
            )));
            match self
                .verify_and_extract(&target, &archive_path, &install_dir, spec, download.sha256.as_deref(), true)
                .await
            {
                Ok(()) => extracted = true,
                Err(error) if options.stale_archive == StaleArchivePolicy::Fail => {
                    return Err(error);
                }
                Err(error) => {
                    tracing::warn!(%target, %error, "stale archive unusable, downloading again");
                    self.emit(Event::error(format!(
                        "Cached archive is unusable ({error}); downloading again"
                    )));
                    remove_file_logged(&archive_path).await;
                }
            }
        }

        if !extracted {
            self.emit(Event::progress(Some(0), format!("Downloading {target}")));
            self.emit(Event::info(format!("Downloading {}", download.url)));
            transfer::download(&download.url, &archive_path, Some(self.transfer_callback(&target)))
                .await
                .map_err(|source| InstallError::Transfer {
                    context: target.clone(),
                    source,
                })?;

            self.verify_and_extract(&target, &archive_path, &install_dir, spec, download.sha256.as_deref(), false)
                .await?;
        }

        let result = self
            .finish_install(&target, companion.as_deref(), &download.url)
            .await;

        // The archive is not needed once extraction succeeded, whatever the
        // outcome of the remaining steps.
        remove_file_logged(&archive_path).await;

        result
    }

    async fn verify_and_extract(
        &self,
        target: &InstallTarget,
        archive_path: &Path,
        install_dir: &Path,
        spec: &RuntimeVersionSpec,
        sha256: Option<&str>,
        stale_archive: bool,
    ) -> Result<(), InstallError> {
        if let Some(expected) = sha256 {
            self.emit(Event::progress(None, format!("Verifying {target}")));
            let archive = archive_path.to_path_buf();
            let expected = expected.to_string();
            let verification = tokio::task::spawn_blocking(move || verify::verify_checksum(&archive, &expected))
                .await
                .map_err(|e| InstallError::io("Checksum task failed", std::io::Error::other(e)))?;
            match verification {
                Ok(()) => {}
                Err(VerifyError::Mismatch { expected, actual }) => {
                    if !stale_archive {
                        remove_file_logged(archive_path).await;
                    }
                    return Err(InstallError::ChecksumMismatch {
                        context: target.clone(),
                        expected,
                        actual,
                    });
                }
                Err(VerifyError::Io(e)) => {
                    return Err(InstallError::io(
                        format!("Failed to read {}", archive_path.display()),
                        e,
                    ));
                }
            }
        }

        if install_dir.exists() {
            tokio::fs::remove_dir_all(install_dir).await.map_err(|e| {
                InstallError::io(
                    format!("Failed to clear {}", install_dir.display()),
                    e,
                )
            })?;
        }

        self.emit(Event::progress(None, format!("Extracting {target}")));
        let archive_path_owned = archive_path.to_path_buf();
        let install_dir_owned = install_dir.to_path_buf();
        let policy = spec.root_policy;
        let extraction = tokio::task::spawn_blocking(move || {
            archive::extract(&archive_path_owned, &install_dir_owned, policy)
        })
        .await
        .map_err(|e| InstallError::io("Extraction task failed", std::io::Error::other(e)))?;

        extraction.map_err(|source| InstallError::ExtractionFailed {
            context: target.clone(),
            stale_archive,
            source,
        })
    }

    async fn finish_install(
        &self,
        target: &InstallTarget,
        companion: Option<&str>,
        source_url: &str,
    ) -> Result<InstalledRuntimeLocation, InstallError> {
        let predicted = self.catalog.resolve_installed_paths(
            target.kind,
            &target.version,
            self.platform,
            &self.paths,
        );
        let Some(location) = self.locate(target.kind, &target.version) else {
            return Err(InstallError::InstalledButMissing {
                context: target.clone(),
                missing: predicted
                    .first_missing()
                    .unwrap_or(predicted.executable_path),
            });
        };

        archive::set_executable_permissions(&location.root_dir).map_err(|e| {
            InstallError::io(
                format!("Failed to set permissions in {}", location.root_dir.display()),
                e,
            )
        })?;

        if let Some(package) = companion {
            self.install_companion_tool(&location, package).await?;
        }

        let location = self.verify_installed(target, location, companion.is_some())?;

        self.paths.write_metadata(&InstallMetadata::now(
            target.kind,
            &target.version,
            source_url,
        ))?;
        self.emit(Event::progress(Some(100), format!("Installed {target}")));
        tracing::info!(%target, root = %location.root_dir.display(), "runtime installed");

        Ok(location)
    }

    fn verify_installed(
        &self,
        target: &InstallTarget,
        location: InstalledRuntimeLocation,
        require_tool: bool,
    ) -> Result<InstalledRuntimeLocation, InstallError> {
        let missing = if require_tool {
            location.first_missing()
        } else {
            [&location.executable_path, &location.package_manager_path]
                .into_iter()
                .find(|path| !path.is_file())
                .cloned()
        };

        match missing {
            Some(missing) => Err(InstallError::InstalledButMissing {
                context: target.clone(),
                missing,
            }),
            None => Ok(location),
        }
    }

    /// Installs a package globally into the runtime with its own package manager.
    async fn install_companion_tool(
        &self,
        location: &InstalledRuntimeLocation,
        package: &str,
    ) -> Result<(), InstallError> {
        self.emit(Event::progress(None, format!("Installing {package}")));
        tracing::info!(package, root = %location.root_dir.display(), "installing companion tool");

        let mut child = tokio::process::Command::new(&location.package_manager_path)
            .args(["install", "-g", package])
            .current_dir(&location.root_dir)
            .env("PATH", search_path_with(&[location.bin_dir.as_path()]))
            .env("npm_config_prefix", &location.root_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InstallError::io(
                    format!("Failed to run {}", location.package_manager_path.display()),
                    e,
                )
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::join!(
            forward_lines(stdout, &self.events, false),
            forward_lines(stderr, &self.events, true),
        );

        let status = child.wait().await.map_err(|e| {
            InstallError::io(format!("Failed to wait for {package} install"), e)
        })?;

        if !status.success() {
            return Err(InstallError::CompanionToolInstallFailed {
                package: package.to_string(),
                exit_code: status.code(),
            });
        }

        Ok(())
    }

    /// Ensures a Node.js version together with its paired companion tool.
    ///
    /// # Errors
    ///
    /// Same as [`Installer::ensure_installed`].
    pub async fn ensure_node(
        &self,
        version: &str,
        options: &InstallOptions,
    ) -> Result<InstalledRuntimeLocation, InstallError> {
        self.ensure_installed(RuntimeKind::Node, version, options).await
    }

    /// Discovers the Java version a project needs and ensures that JDK plus Maven.
    ///
    /// A discovered version missing from the catalog falls back to
    /// [`DEFAULT_JAVA_VERSION`].
    ///
    /// # Errors
    ///
    /// Same as [`Installer::ensure_installed`], for either runtime.
    pub async fn ensure_java_toolchain(
        &self,
        query: &JavaVersionQuery,
        options: &InstallOptions,
    ) -> Result<JavaToolchain, InstallError> {
        let mut java_version = discover_java_version(query).await;
        self.emit(Event::info(format!(
            "Using Java {} ({})",
            java_version.version,
            java_version.rule.unwrap_or("default")
        )));

        if self.catalog.get(RuntimeKind::Jdk, &java_version.version).is_none() {
            tracing::warn!(version = %java_version.version, "no JDK bundle for discovered version");
            self.emit(Event::error(format!(
                "No JDK {} bundle available, using {DEFAULT_JAVA_VERSION}",
                java_version.version
            )));
            java_version.version = DEFAULT_JAVA_VERSION.to_string();
        }

        self.ensure_java_toolchain_for(java_version, options).await
    }

    /// Ensures a specific JDK feature release plus Maven.
    ///
    /// # Errors
    ///
    /// Same as [`Installer::ensure_installed`], for either runtime.
    pub async fn ensure_java_toolchain_for(
        &self,
        java_version: DiscoveredJavaVersion,
        options: &InstallOptions,
    ) -> Result<JavaToolchain, InstallError> {
        let jdk = self
            .ensure_installed(RuntimeKind::Jdk, &java_version.version, options)
            .await?;
        let maven = self
            .ensure_installed(RuntimeKind::Maven, MAVEN_VERSION, options)
            .await?;
        Ok(JavaToolchain {
            jdk,
            maven,
            java_version,
        })
    }

    /// Lists installed versions of a kind, oldest first.
    ///
    /// Version directories that do not hold a complete runtime are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind directory cannot be read.
    pub fn installed(&self, kind: RuntimeKind) -> Result<Vec<InstalledRuntime>, InstallError> {
        Ok(self
            .paths
            .list_version_dirs(kind)?
            .into_iter()
            .filter_map(|version| {
                let location = self.locate(kind, &version)?;
                Some(InstalledRuntime {
                    metadata: self.paths.read_metadata(kind, &version),
                    location,
                })
            })
            .collect())
    }

    /// Removes an installed version. Returns `false` if nothing was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the install directory cannot be removed.
    pub async fn uninstall(&self, kind: RuntimeKind, version: &str) -> Result<bool, InstallError> {
        let lock = self.version_lock(kind, version).await;
        let _guard = lock.lock().await;

        let install_dir = self.paths.install_dir(kind, version);
        if !install_dir.exists() {
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&install_dir).await.map_err(|e| {
            InstallError::io(format!("Failed to remove {}", install_dir.display()), e)
        })?;
        self.emit(Event::info(format!("Removed {kind} {version}")));
        Ok(true)
    }

    fn emit(&self, event: Event) {
        (self.events)(event);
    }

    fn transfer_callback(&self, target: &InstallTarget) -> TransferCallback {
        let events = Arc::clone(&self.events);
        let label = target.to_string();
        Arc::new(move |event: TransferEvent| {
            let percent = event.percent();
            match event {
                TransferEvent::Progress {
                    downloaded, speed, ..
                } => events(Event::progress(
                    percent,
                    format!(
                        "Downloading {label}: {} ({})",
                        format_bytes(downloaded),
                        format_speed(speed)
                    ),
                )),
                TransferEvent::Redirected { to, .. } => {
                    events(Event::info(format!("Redirected to {to}")));
                }
                TransferEvent::Completed { bytes } => events(Event::progress(
                    percent,
                    format!("Downloaded {label} ({})", format_bytes(bytes)),
                )),
                TransferEvent::Failed { error } => {
                    events(Event::error(format!("Download of {label} failed: {error}")));
                }
                TransferEvent::Started { .. } => {}
            }
        })
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, events: &EventSink, is_error: bool) {
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => events(Event::Log {
                message: line,
                is_error,
            }),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading package manager output");
                break;
            }
        }
    }
}

async fn remove_file_logged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove archive");
    }
}
