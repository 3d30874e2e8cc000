//! Read-only access to the project configuration store.
//!
//! The store is a TOML file (`projects.toml` in the base directory) written by
//! whatever front end manages projects. Each project may pin a Node.js
//! version, a Java version and a set of environment overrides:
//!
//! ```toml
//! [projects.shop-ui]
//! node_version = "18.20.4"
//! env = "QVBJX1VSTD1odHRwOi8vbG9jYWxob3N0OjgwODAK"
//!
//! [projects.billing]
//! java_version = "21"
//! ```
//!
//! `env` holds base64 of `KEY=VALUE` lines so values can contain anything.
//! A missing or malformed store reads as empty; it never blocks a start.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::catalog::DEFAULT_NODE_VERSION;

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    projects: BTreeMap<String, RawProject>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProject {
    node_version: Option<String>,
    java_version: Option<String>,
    env: Option<String>,
}

/// Settings of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Pinned Node.js version.
    pub node_version: Option<String>,
    /// Pinned Java feature release; discovery is used when absent.
    pub java_version: Option<String>,
    /// Environment overrides applied to the project's processes.
    pub env: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// Pinned Node.js version or the default one.
    #[must_use]
    pub fn node_version_or_default(&self) -> &str {
        self.node_version.as_deref().unwrap_or(DEFAULT_NODE_VERSION)
    }
}

/// Parsed project store.
#[derive(Debug, Clone, Default)]
pub struct ProjectStore {
    projects: BTreeMap<String, ProjectConfig>,
}

impl ProjectStore {
    /// Loads the store, treating a missing or unreadable file as empty.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read project store");
                Self::default()
            }
        }
    }

    /// Parses store content, treating malformed TOML as empty.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let file: StoreFile = match toml::from_str(content) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(error = %e, "malformed project store, ignoring it");
                return Self::default();
            }
        };

        let projects = file
            .projects
            .into_iter()
            .map(|(name, raw)| {
                let env = match raw.env.as_deref() {
                    Some(blob) => decode_env(blob).unwrap_or_else(|| {
                        tracing::warn!(project = %name, "malformed env blob, ignoring it");
                        BTreeMap::new()
                    }),
                    None => BTreeMap::new(),
                };
                let config = ProjectConfig {
                    node_version: non_empty(raw.node_version),
                    java_version: non_empty(raw.java_version),
                    env,
                };
                (name, config)
            })
            .collect();

        Self { projects }
    }

    /// Settings of a project, defaults if it is not in the store.
    #[must_use]
    pub fn get(&self, project: &str) -> ProjectConfig {
        self.projects.get(project).cloned().unwrap_or_default()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Decodes a base64 blob of `KEY=VALUE` lines.
///
/// Blank lines, `#` comments and lines without `=` are skipped. Returns
/// `None` if the blob is not valid base64 or not UTF-8.
#[must_use]
pub fn decode_env(blob: &str) -> Option<BTreeMap<String, String>> {
    let bytes = STANDARD.decode(blob.trim()).ok()?;
    let text = String::from_utf8(bytes).ok()?;

    Some(
        text.lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect(),
    )
}
