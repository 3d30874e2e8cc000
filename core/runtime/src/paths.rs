//! Base directory management for installed runtimes.
//!
//! Where runtimes live depends on how the application was launched. A
//! development checkout keeps them under `.devrt/` in the working directory;
//! a packaged install keeps them in `runtimes/` next to its own executable so
//! the directory stays writable after installation. `DEVRT_HOME` overrides
//! both.
//!
//! ## Directory Structure
//!
//! ```text
//! <base>/
//!   node/
//!     20.18.0/              # Strip policy: archive root removed
//!       bin/node
//!       bin/npm
//!       bin/ng              # companion tool installed by npm -g
//!       .devrt-install.json
//!   jdk/
//!     17/
//!       bin/java
//!   maven/
//!     3.9.9/
//!       apache-maven-3.9.9/ # Preserve policy: archive root kept
//!         bin/mvn
//!   downloads/              # archives in flight or left by an interrupted run
//!   projects.toml           # project configuration store
//! ```

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::catalog::RuntimeKind;
use crate::errors::InstallError;

/// Environment variable overriding the base directory.
pub const DEVRT_HOME_ENV: &str = "DEVRT_HOME";

/// Metadata file written into every install directory.
const METADATA_FILE: &str = ".devrt-install.json";

/// File name of the project configuration store.
const PROJECT_STORE_FILE: &str = "projects.toml";

/// How the application was launched, which decides the default base directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseContext {
    /// Running from a checkout: `./.devrt`.
    #[default]
    Development,
    /// Running from an installed package: `<exe dir>/runtimes`.
    Packaged,
}

/// Informational record of a completed install.
///
/// Never consulted to decide whether a runtime is installed; that is decided
/// by the executables alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMetadata {
    /// Runtime kind.
    pub kind: RuntimeKind,
    /// Installed version.
    pub version: String,
    /// URL the archive was downloaded from.
    pub source_url: String,
    /// Unix timestamp of the install.
    pub installed_at: u64,
}

impl InstallMetadata {
    /// Creates metadata stamped with the current time.
    #[must_use = "returns new metadata without side effects"]
    pub fn now(kind: RuntimeKind, version: &str, source_url: &str) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            kind,
            version: version.to_string(),
            source_url: source_url.to_string(),
            installed_at,
        }
    }

    /// Returns a coarse "installed N days ago" string.
    #[must_use = "returns formatted time without side effects"]
    pub fn installed_ago(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        match now.saturating_sub(self.installed_at) / 86_400 {
            0 => "today".to_string(),
            1 => "yesterday".to_string(),
            days @ 2..=59 => format!("{days} days ago"),
            days @ 60..=729 => format!("{} months ago", days / 30),
            days => format!("{} years ago", days / 365),
        }
    }
}

/// Paths of everything devrt keeps on disk.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Base directory.
    pub root: PathBuf,
    /// Cache for downloaded archives.
    pub downloads: PathBuf,
}

impl RuntimePaths {
    /// Resolves the base directory for the given launch context.
    ///
    /// Resolution order:
    /// 1. `DEVRT_HOME` if set
    /// 2. Development: `.devrt` under the current directory
    /// 3. Packaged: `runtimes` next to the current executable, falling back to
    ///    the user data directory when the executable location is unknown
    ///
    /// # Errors
    ///
    /// Returns an error if neither the working directory nor a data directory
    /// can be determined.
    pub fn resolve(context: BaseContext) -> Result<Self, InstallError> {
        if let Ok(home) = std::env::var(DEVRT_HOME_ENV)
            && !home.trim().is_empty()
        {
            return Ok(Self::with_root(PathBuf::from(home)));
        }

        let root = match context {
            BaseContext::Development => std::env::current_dir()
                .map_err(|e| InstallError::io("Cannot determine working directory", e))?
                .join(".devrt"),
            BaseContext::Packaged => {
                let exe_dir = std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf));
                match exe_dir {
                    Some(dir) => dir.join("runtimes"),
                    None => dirs::data_dir()
                        .ok_or_else(|| {
                            InstallError::io(
                                "Cannot determine data directory. Set DEVRT_HOME.",
                                std::io::Error::from(std::io::ErrorKind::NotFound),
                            )
                        })?
                        .join("devrt")
                        .join("runtimes"),
                }
            }
        };

        Ok(Self::with_root(root))
    }

    /// Creates paths rooted at a specific directory.
    #[must_use = "returns new paths instance without side effects"]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            downloads: root.join("downloads"),
            root,
        }
    }

    /// Directory holding every version of a runtime kind.
    #[must_use = "returns the path without side effects"]
    pub fn kind_dir(&self, kind: RuntimeKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Extraction target for one version.
    #[must_use = "returns the path without side effects"]
    pub fn install_dir(&self, kind: RuntimeKind, version: &str) -> PathBuf {
        self.kind_dir(kind).join(version)
    }

    /// Returns the path for a downloaded archive file.
    #[must_use = "returns the path without side effects"]
    pub fn download_path(&self, filename: &str) -> PathBuf {
        self.downloads.join(filename)
    }

    /// Returns the path of the project configuration store.
    #[must_use = "returns the path without side effects"]
    pub fn project_store_path(&self) -> PathBuf {
        self.root.join(PROJECT_STORE_FILE)
    }

    /// Returns the metadata file path for one install.
    #[must_use = "returns the metadata path without side effects"]
    pub fn metadata_path(&self, kind: RuntimeKind, version: &str) -> PathBuf {
        self.install_dir(kind, version).join(METADATA_FILE)
    }

    /// Writes installation metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata file cannot be written.
    pub fn write_metadata(&self, metadata: &InstallMetadata) -> Result<(), InstallError> {
        let path = self.metadata_path(metadata.kind, &metadata.version);
        let content = serde_json::to_string_pretty(metadata)
            .map_err(|e| InstallError::io("Failed to serialize install metadata", e.into()))?;
        std::fs::write(&path, content).map_err(|e| {
            InstallError::io(format!("Failed to write metadata to {}", path.display()), e)
        })
    }

    /// Reads installation metadata, `None` if missing or unreadable.
    #[must_use = "returns metadata without side effects"]
    pub fn read_metadata(&self, kind: RuntimeKind, version: &str) -> Option<InstallMetadata> {
        let content = std::fs::read_to_string(self.metadata_path(kind, version)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Lists version directories present for a runtime kind, sorted.
    ///
    /// Presence of a directory does not mean the runtime is usable; combine with
    /// the catalog's installed check.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind directory exists but cannot be read.
    pub fn list_version_dirs(&self, kind: RuntimeKind) -> Result<Vec<String>, InstallError> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir)
            .map_err(|e| InstallError::io(format!("Failed to read {}", dir.display()), e))?;

        let mut versions: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();

        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }

    /// Creates the base and downloads directories.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_directories(&self) -> Result<(), InstallError> {
        for dir in [&self.root, &self.downloads] {
            std::fs::create_dir_all(dir).map_err(|e| {
                InstallError::io(format!("Failed to create directory: {}", dir.display()), e)
            })?;
        }
        Ok(())
    }
}

/// Builds a `PATH` value with `dirs` in front of the inherited search path.
#[must_use]
pub fn search_path_with(dirs: &[&Path]) -> std::ffi::OsString {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let entries = dirs
        .iter()
        .map(|dir| dir.to_path_buf())
        .chain(std::env::split_paths(&inherited));
    std::env::join_paths(entries).unwrap_or(inherited)
}

/// Orders version strings numerically where possible (`8 < 11 < 17`,
/// `18.20.4 < 20.18.0`), lexically otherwise.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (lenient_semver(a), lenient_semver(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => a.cmp(b),
    }
}

/// Parses `17`, `17.0` and `17.0.2` alike.
fn lenient_semver(version: &str) -> Option<semver::Version> {
    let trimmed = version.trim_start_matches('v');
    let padded = match trimmed.matches('.').count() {
        0 => format!("{trimmed}.0.0"),
        1 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_test_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("devrt_paths_{}_{}", name, rand::random::<u64>()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        dir
    }

    #[test]
    fn install_dir_is_kind_then_version() {
        let root = env::temp_dir().join("devrt_test_install_dir");
        let paths = RuntimePaths::with_root(root.clone());

        assert_eq!(
            paths.install_dir(RuntimeKind::Node, "20.18.0"),
            root.join("node").join("20.18.0")
        );
        assert_eq!(
            paths.install_dir(RuntimeKind::Maven, "3.9.9"),
            root.join("maven").join("3.9.9")
        );
        assert_eq!(paths.downloads, root.join("downloads"));
        assert_eq!(paths.project_store_path(), root.join("projects.toml"));
    }

    #[test]
    fn list_version_dirs_is_empty_without_kind_dir() {
        let paths = RuntimePaths::with_root(env::temp_dir().join("devrt_test_nothing_here"));
        let versions = paths
            .list_version_dirs(RuntimeKind::Jdk)
            .expect("Should list versions");
        assert!(versions.is_empty());
    }

    #[test]
    fn list_version_dirs_sorts_numerically() {
        let root = temp_test_dir("sort");
        let paths = RuntimePaths::with_root(root.clone());
        for version in ["21", "8", "17", "11"] {
            std::fs::create_dir_all(paths.install_dir(RuntimeKind::Jdk, version))
                .expect("Should create dir");
        }
        std::fs::write(paths.kind_dir(RuntimeKind::Jdk).join("stray.txt"), "x")
            .expect("Should write file");

        let versions = paths
            .list_version_dirs(RuntimeKind::Jdk)
            .expect("Should list versions");
        assert_eq!(versions, vec!["8", "11", "17", "21"]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn metadata_round_trips_through_install_dir() {
        let root = temp_test_dir("metadata");
        let paths = RuntimePaths::with_root(root.clone());
        std::fs::create_dir_all(paths.install_dir(RuntimeKind::Node, "18.20.4"))
            .expect("Should create dir");

        let metadata = InstallMetadata::now(RuntimeKind::Node, "18.20.4", "https://x/node.tar.xz");
        paths.write_metadata(&metadata).expect("Should write metadata");

        let read = paths
            .read_metadata(RuntimeKind::Node, "18.20.4")
            .expect("Should read metadata");
        assert_eq!(read, metadata);
        assert_eq!(read.installed_ago(), "today");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn search_path_with_puts_dirs_first() {
        let value = search_path_with(&[Path::new("/opt/node/bin"), Path::new("/opt/jdk/bin")]);
        let entries: Vec<PathBuf> = env::split_paths(&value).collect();
        assert_eq!(entries[0], PathBuf::from("/opt/node/bin"));
        assert_eq!(entries[1], PathBuf::from("/opt/jdk/bin"));
    }

    #[test]
    fn compare_versions_handles_short_and_long_forms() {
        use std::cmp::Ordering;
        assert_eq!(compare_versions("8", "11"), Ordering::Less);
        assert_eq!(compare_versions("18.20.4", "20.18.0"), Ordering::Less);
        assert_eq!(compare_versions("17", "17.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("custom", "abc"), Ordering::Greater);
    }
}
