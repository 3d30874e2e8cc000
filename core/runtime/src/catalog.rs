//! Static catalog of installable runtimes and their on-disk layout.
//!
//! The catalog maps a logical version (`node 20.18.0`, `jdk 17`,
//! `maven 3.9.9`) to a per-platform download, the archive format and root
//! policy to unpack it with, and the companion package to install into it.
//! It also computes where the executables of an installed version live.
//!
//! Nothing here touches the network. The only filesystem access is the
//! installed check and the bounded fallback walk used when an archive's
//! extracted root cannot be predicted.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::archive::RootPolicy;
use crate::errors::{InstallError, InstallTarget};
use crate::paths::RuntimePaths;
use crate::platform::Platform;

/// Environment variable overriding the Node.js distribution server.
pub const NODE_MIRROR_ENV: &str = "DEVRT_NODE_MIRROR";
/// Environment variable overriding the Adoptium API server.
pub const JDK_MIRROR_ENV: &str = "DEVRT_JDK_MIRROR";
/// Environment variable overriding the Apache archive server.
pub const MAVEN_MIRROR_ENV: &str = "DEVRT_MAVEN_MIRROR";

const DEFAULT_NODE_MIRROR: &str = "https://nodejs.org/dist";
const DEFAULT_JDK_MIRROR: &str = "https://api.adoptium.net";
const DEFAULT_MAVEN_MIRROR: &str = "https://archive.apache.org/dist";

/// Node.js version used when a project does not pick one.
pub const DEFAULT_NODE_VERSION: &str = "20.18.0";
/// JDK feature release used when discovery finds nothing.
pub const DEFAULT_JAVA_VERSION: &str = "17";
/// The single Maven build shipped with devrt.
pub const MAVEN_VERSION: &str = "3.9.9";

/// Depth bound of the unknown-layout walk.
pub const DEFAULT_WALK_DEPTH: usize = 4;

/// Pinned Node.js versions and the Angular CLI each one pairs with.
const NODE_RELEASES: [(&str, &str); 4] = [
    ("16.20.2", "@angular/cli@15"),
    ("18.20.4", "@angular/cli@17"),
    ("20.18.0", "@angular/cli@18"),
    ("22.11.0", "@angular/cli@19"),
];

/// JDK feature releases offered through Adoptium.
const JDK_RELEASES: [&str; 4] = ["8", "11", "17", "21"];

/// Family of runtime; the "purpose" of an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Node.js with npm.
    Node,
    /// A Java development kit.
    Jdk,
    /// Apache Maven.
    Maven,
}

impl RuntimeKind {
    /// All kinds, in display order.
    pub const ALL: [RuntimeKind; 3] = [Self::Node, Self::Jdk, Self::Maven];

    /// Directory name under the base directory.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Jdk => "jdk",
            Self::Maven => "maven",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "node" | "nodejs" => Ok(Self::Node),
            "jdk" | "java" => Ok(Self::Jdk),
            "maven" | "mvn" => Ok(Self::Maven),
            other => Err(format!("unknown runtime kind '{other}' (expected node, jdk or maven)")),
        }
    }
}

/// Archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// `.zip`
    Zip,
    /// `.tar.gz`
    TarGz,
    /// `.tar.xz`
    TarXz,
}

impl ArchiveKind {
    /// Canonical file extension, without the leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
        }
    }

    /// Infers the format from a file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else {
            None
        }
    }
}

impl FromStr for ArchiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "tar.xz" | "txz" => Ok(Self::TarXz),
            other => Err(format!("unknown archive format '{other}'")),
        }
    }
}

/// One downloadable bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Where to fetch it.
    pub url: String,
    /// Container format; the URL does not always reveal it.
    pub archive: ArchiveKind,
    /// Published SHA256, when known.
    pub sha256: Option<String>,
}

/// An installable runtime version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersionSpec {
    /// Runtime family.
    pub kind: RuntimeKind,
    /// Version identifier.
    pub version: String,
    /// Bundle per platform; absent platforms are not available.
    pub downloads: BTreeMap<Platform, Download>,
    /// How the archive's root folder is treated.
    pub root_policy: RootPolicy,
    /// Package installed into the runtime with its own package manager.
    pub companion_tool: Option<String>,
}

impl RuntimeVersionSpec {
    /// Builds a custom spec with the same bundle for every platform.
    #[must_use]
    pub fn custom(kind: RuntimeKind, version: &str, url: &str, archive: ArchiveKind) -> Self {
        let download = Download {
            url: url.to_string(),
            archive,
            sha256: None,
        };
        Self {
            kind,
            version: version.to_string(),
            downloads: Platform::ALL
                .into_iter()
                .map(|platform| (platform, download.clone()))
                .collect(),
            root_policy: RootPolicy::Strip,
            companion_tool: None,
        }
    }

    /// Sets the expected SHA256 on every platform bundle.
    #[must_use]
    pub fn with_sha256(mut self, sha256: &str) -> Self {
        for download in self.downloads.values_mut() {
            download.sha256 = Some(sha256.to_ascii_lowercase());
        }
        self
    }

    /// File name the archive is stored under in the downloads directory.
    #[must_use]
    pub fn archive_file_name(&self, platform: Platform, archive: ArchiveKind) -> String {
        format!(
            "{}-{}-{}.{}",
            self.kind,
            self.version,
            platform.as_str(),
            archive.extension()
        )
    }
}

/// Base URLs of the vendors' distribution servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirrors {
    /// Node.js `dist` root.
    pub node: String,
    /// Adoptium API root.
    pub jdk: String,
    /// Apache archive root.
    pub maven: String,
}

impl Default for Mirrors {
    fn default() -> Self {
        Self {
            node: DEFAULT_NODE_MIRROR.to_string(),
            jdk: DEFAULT_JDK_MIRROR.to_string(),
            maven: DEFAULT_MAVEN_MIRROR.to_string(),
        }
    }
}

impl Mirrors {
    /// Reads mirror overrides from the environment, defaulting per vendor.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |var: &str, default: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
                .trim_end_matches('/')
                .to_string()
        };
        Self {
            node: read(NODE_MIRROR_ENV, DEFAULT_NODE_MIRROR),
            jdk: read(JDK_MIRROR_ENV, DEFAULT_JDK_MIRROR),
            maven: read(MAVEN_MIRROR_ENV, DEFAULT_MAVEN_MIRROR),
        }
    }
}

/// Resolved on-disk location of an installed (or to-be-installed) runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRuntimeLocation {
    /// Runtime family.
    pub kind: RuntimeKind,
    /// Version identifier.
    pub version: String,
    /// Extraction target.
    pub install_dir: PathBuf,
    /// Directory the layout below is relative to.
    pub root_dir: PathBuf,
    /// Directory holding the executables; prepended to `PATH` when running them.
    pub bin_dir: PathBuf,
    /// Main executable (`node`, `java`, `mvn`).
    pub executable_path: PathBuf,
    /// Second binary the layout must contain (`npm`, `javac`, `mvnDebug`).
    pub package_manager_path: PathBuf,
    /// Companion tool executable, when the version declares one.
    pub tool_path: Option<PathBuf>,
}

impl InstalledRuntimeLocation {
    /// Returns whether both executables exist as regular files.
    ///
    /// This is the only definition of "installed": a directory holding just one
    /// of them is a partial extraction and safe to replace.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.executable_path.is_file() && self.package_manager_path.is_file()
    }

    /// Returns the first expected file that does not exist, tool included.
    #[must_use]
    pub fn first_missing(&self) -> Option<PathBuf> {
        [
            Some(&self.executable_path),
            Some(&self.package_manager_path),
            self.tool_path.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find(|path| !path.is_file())
        .cloned()
    }

    /// Re-anchors the layout at a different root directory.
    #[must_use]
    pub fn rooted_at(&self, platform: Platform, root_dir: PathBuf) -> Self {
        let layout = Layout::of(self.kind, platform);
        Self {
            bin_dir: root_dir.join(layout.bin_dir),
            executable_path: root_dir.join(&layout.executable),
            package_manager_path: root_dir.join(&layout.package_manager),
            tool_path: self
                .tool_path
                .as_ref()
                .and(layout.tool.as_ref())
                .map(|tool| root_dir.join(tool)),
            root_dir,
            kind: self.kind,
            version: self.version.clone(),
            install_dir: self.install_dir.clone(),
        }
    }
}

/// Relative executable layout of a runtime kind on a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Directory of the executables relative to the root (`""` or `"bin"`).
    pub bin_dir: &'static str,
    /// Main executable, relative.
    pub executable: PathBuf,
    /// Paired binary, relative.
    pub package_manager: PathBuf,
    /// Companion tool, relative, for kinds that have one.
    pub tool: Option<PathBuf>,
}

impl Layout {
    /// Computes the layout for a kind on a platform.
    ///
    /// Windows Node.js bundles are flat (`node.exe`, `npm.cmd` at the root);
    /// everything else keeps executables under `bin/`.
    #[must_use]
    pub fn of(kind: RuntimeKind, platform: Platform) -> Self {
        let exe = platform.executable_extension();
        let script = platform.script_extension();
        let bin_dir = if kind == RuntimeKind::Node && platform.is_windows() {
            ""
        } else {
            "bin"
        };
        let in_bin = |name: String| Path::new(bin_dir).join(name);

        match kind {
            RuntimeKind::Node => Self {
                bin_dir,
                executable: in_bin(format!("node{exe}")),
                package_manager: in_bin(format!("npm{script}")),
                tool: Some(in_bin(format!("ng{script}"))),
            },
            RuntimeKind::Jdk => Self {
                bin_dir,
                executable: in_bin(format!("java{exe}")),
                package_manager: in_bin(format!("javac{exe}")),
                tool: None,
            },
            RuntimeKind::Maven => Self {
                bin_dir,
                executable: in_bin(format!("mvn{script}")),
                package_manager: in_bin(format!("mvnDebug{script}")),
                tool: None,
            },
        }
    }
}

/// The set of runtimes devrt knows how to install.
#[derive(Debug, Clone)]
pub struct Catalog {
    specs: Vec<RuntimeVersionSpec>,
}

impl Catalog {
    /// Builds the built-in catalog against the given mirrors.
    #[must_use]
    pub fn builtin(mirrors: &Mirrors) -> Self {
        let mut specs = Vec::new();

        for (version, cli) in NODE_RELEASES {
            specs.push(RuntimeVersionSpec {
                kind: RuntimeKind::Node,
                version: version.to_string(),
                downloads: Platform::ALL
                    .into_iter()
                    .map(|platform| (platform, node_download(&mirrors.node, version, platform)))
                    .collect(),
                root_policy: RootPolicy::Strip,
                companion_tool: Some(cli.to_string()),
            });
        }

        for feature in JDK_RELEASES {
            specs.push(RuntimeVersionSpec {
                kind: RuntimeKind::Jdk,
                version: feature.to_string(),
                downloads: Platform::ALL
                    .into_iter()
                    // Adoptium never published a JDK 8 build for Apple Silicon.
                    .filter(|platform| !(feature == "8" && *platform == Platform::MacosArm64))
                    .map(|platform| (platform, jdk_download(&mirrors.jdk, feature, platform)))
                    .collect(),
                root_policy: RootPolicy::Strip,
                companion_tool: None,
            });
        }

        let maven = Download {
            url: format!(
                "{}/maven/maven-3/{MAVEN_VERSION}/binaries/apache-maven-{MAVEN_VERSION}-bin.zip",
                mirrors.maven
            ),
            archive: ArchiveKind::Zip,
            sha256: None,
        };
        specs.push(RuntimeVersionSpec {
            kind: RuntimeKind::Maven,
            version: MAVEN_VERSION.to_string(),
            downloads: Platform::ALL
                .into_iter()
                .map(|platform| (platform, maven.clone()))
                .collect(),
            root_policy: RootPolicy::Preserve,
            companion_tool: None,
        });

        Self { specs }
    }

    /// Built-in catalog with mirrors read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::builtin(&Mirrors::from_env())
    }

    /// Adds or replaces a spec, typically a custom version.
    pub fn register(&mut self, spec: RuntimeVersionSpec) {
        self.specs
            .retain(|s| !(s.kind == spec.kind && s.version == spec.version));
        self.specs.push(spec);
    }

    /// Looks up a version.
    #[must_use]
    pub fn get(&self, kind: RuntimeKind, version: &str) -> Option<&RuntimeVersionSpec> {
        self.specs
            .iter()
            .find(|spec| spec.kind == kind && spec.version == version)
    }

    /// Versions of a kind, in catalog order.
    pub fn available(&self, kind: RuntimeKind) -> impl Iterator<Item = &RuntimeVersionSpec> {
        self.specs.iter().filter(move |spec| spec.kind == kind)
    }

    /// Companion package paired with a version.
    #[must_use]
    pub fn companion_tool(&self, kind: RuntimeKind, version: &str) -> Option<&str> {
        self.get(kind, version)?.companion_tool.as_deref()
    }

    /// Resolves the bundle to download for a version on a platform.
    ///
    /// # Errors
    ///
    /// - [`InstallError::UnknownVersion`] if the version is not in the catalog
    /// - [`InstallError::NotAvailableForPlatform`] if it has no bundle for `platform`
    pub fn resolve_download_url(
        &self,
        kind: RuntimeKind,
        version: &str,
        platform: Platform,
    ) -> Result<&Download, InstallError> {
        let spec = self
            .get(kind, version)
            .ok_or_else(|| InstallError::UnknownVersion {
                kind,
                version: version.to_string(),
            })?;
        spec.downloads
            .get(&platform)
            .ok_or_else(|| InstallError::NotAvailableForPlatform {
                context: InstallTarget {
                    kind,
                    version: version.to_string(),
                    platform,
                },
            })
    }

    /// Computes the predicted location of a version.
    ///
    /// Pure path arithmetic: nothing is checked on disk.
    #[must_use]
    pub fn resolve_installed_paths(
        &self,
        kind: RuntimeKind,
        version: &str,
        platform: Platform,
        paths: &RuntimePaths,
    ) -> InstalledRuntimeLocation {
        let install_dir = paths.install_dir(kind, version);
        let spec = self.get(kind, version);
        let root_dir = match spec.map(|s| s.root_policy) {
            Some(RootPolicy::Preserve) if kind == RuntimeKind::Maven => {
                install_dir.join(format!("apache-maven-{version}"))
            }
            _ => install_dir.clone(),
        };
        let has_tool = spec.is_some_and(|s| s.companion_tool.is_some());

        let layout = Layout::of(kind, platform);
        InstalledRuntimeLocation {
            kind,
            version: version.to_string(),
            bin_dir: root_dir.join(layout.bin_dir),
            executable_path: root_dir.join(&layout.executable),
            package_manager_path: root_dir.join(&layout.package_manager),
            tool_path: layout
                .tool
                .filter(|_| has_tool)
                .map(|tool| root_dir.join(tool)),
            install_dir,
            root_dir,
        }
    }

    /// Finds an installed version, trying the predicted layout first and then a
    /// bounded walk of the install directory.
    #[must_use]
    pub fn locate_installed(
        &self,
        kind: RuntimeKind,
        version: &str,
        platform: Platform,
        paths: &RuntimePaths,
    ) -> Option<InstalledRuntimeLocation> {
        let predicted = self.resolve_installed_paths(kind, version, platform, paths);
        if predicted.is_installed() {
            return Some(predicted);
        }

        let layout = Layout::of(kind, platform);
        let root = find_runtime_root(
            &predicted.install_dir,
            &layout.executable,
            &layout.package_manager,
            DEFAULT_WALK_DEPTH,
        )?;
        Some(predicted.rooted_at(platform, root))
    }
}

/// Returns whether a location is installed.
#[must_use]
pub fn is_installed(location: &InstalledRuntimeLocation) -> bool {
    location.is_installed()
}

/// Breadth-first search for the first directory containing both files.
///
/// `max_depth` counts directory levels below `start` (0 checks `start` only).
/// Symlinked directories are not followed. The walk stops at the first match.
#[must_use]
pub fn find_runtime_root(
    start: &Path,
    executable: &Path,
    package_manager: &Path,
    max_depth: usize,
) -> Option<PathBuf> {
    let mut queue = VecDeque::from([(start.to_path_buf(), 0usize)]);

    while let Some((dir, depth)) = queue.pop_front() {
        if dir.join(executable).is_file() && dir.join(package_manager).is_file() {
            return Some(dir);
        }
        if depth == max_depth {
            continue;
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.path())
            .collect();
        children.sort();
        queue.extend(children.into_iter().map(|child| (child, depth + 1)));
    }

    None
}

fn node_download(mirror: &str, version: &str, platform: Platform) -> Download {
    let archive = match platform {
        Platform::WindowsX64 => ArchiveKind::Zip,
        Platform::LinuxX64 | Platform::LinuxArm64 => ArchiveKind::TarXz,
        Platform::MacosX64 | Platform::MacosArm64 => ArchiveKind::TarGz,
    };
    Download {
        url: format!(
            "{mirror}/v{version}/node-v{version}-{}-{}.{}",
            platform.node_os(),
            platform.node_arch(),
            archive.extension()
        ),
        archive,
        sha256: None,
    }
}

fn jdk_download(mirror: &str, feature: &str, platform: Platform) -> Download {
    let archive = if platform.is_windows() {
        ArchiveKind::Zip
    } else {
        ArchiveKind::TarGz
    };
    Download {
        url: format!(
            "{mirror}/v3/binary/latest/{feature}/ga/{}/{}/jdk/hotspot/normal/eclipse",
            platform.adoptium_os(),
            platform.adoptium_arch()
        ),
        archive,
        sha256: None,
    }
}
