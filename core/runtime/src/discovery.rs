//! Java version discovery from Maven project descriptors.
//!
//! A Spring project declares the Java release it targets in its `pom.xml`,
//! under one of several properties. The properties are tried in order and the
//! first one holding a usable value wins:
//!
//! 1. `java.version` (Spring Boot parent convention)
//! 2. `maven.compiler.release`
//! 3. `maven.compiler.source`
//!
//! Values are normalised to a feature release: `1.8` becomes `8`, `17.0.2`
//! becomes `17`. Property references such as `${java.version}` are skipped.
//!
//! Discovery never fails. When no descriptor is reachable or nothing matches,
//! the result is [`DEFAULT_JAVA_VERSION`] with [`VersionSource::Fallback`].

use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::DEFAULT_JAVA_VERSION;

/// Timeout for fetching a remote descriptor.
pub const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Named rule pulling a version out of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionRule {
    /// Property element name.
    pub tag: &'static str,
}

/// Rules in priority order.
pub const RULES: [ExtractionRule; 3] = [
    ExtractionRule { tag: "java.version" },
    ExtractionRule {
        tag: "maven.compiler.release",
    },
    ExtractionRule {
        tag: "maven.compiler.source",
    },
];

impl ExtractionRule {
    /// Applies the rule, returning the normalised version if the element is
    /// present with a concrete value.
    #[must_use]
    pub fn apply(&self, xml: &str) -> Option<String> {
        let open = format!("<{}>", self.tag);
        let close = format!("</{}>", self.tag);

        let mut rest = xml;
        while let Some(start) = rest.find(&open) {
            let after_open = &rest[start + open.len()..];
            let end = after_open.find(&close)?;
            if let Some(version) = normalize_java_version(&after_open[..end]) {
                return Some(version);
            }
            rest = &after_open[end + close.len()..];
        }
        None
    }
}

/// Where the descriptor came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    /// A `pom.xml` on disk.
    Local(PathBuf),
    /// A descriptor fetched over HTTP.
    Remote(String),
    /// Set explicitly by the caller; no descriptor was read.
    Pinned,
    /// Nothing usable was found.
    Fallback,
}

/// Outcome of discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredJavaVersion {
    /// Feature release, e.g. `"17"`.
    pub version: String,
    /// Where it came from.
    pub source: VersionSource,
    /// The property that matched, absent for pinned and fallback versions.
    pub rule: Option<&'static str>,
}

impl DiscoveredJavaVersion {
    /// A version chosen by the caller rather than discovered.
    #[must_use]
    pub fn pinned(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            source: VersionSource::Pinned,
            rule: None,
        }
    }

    fn fallback() -> Self {
        Self {
            version: DEFAULT_JAVA_VERSION.to_string(),
            source: VersionSource::Fallback,
            rule: None,
        }
    }
}

/// Where to look for a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JavaVersionQuery {
    /// Project directory or path of the `pom.xml` itself.
    pub project: Option<PathBuf>,
    /// URL of a raw `pom.xml`, used when no local file exists.
    pub pom_url: Option<String>,
}

impl JavaVersionQuery {
    /// Query for a local project.
    #[must_use]
    pub fn local(project: impl Into<PathBuf>) -> Self {
        Self {
            project: Some(project.into()),
            pom_url: None,
        }
    }

    /// Query for a remote descriptor.
    #[must_use]
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            project: None,
            pom_url: Some(url.into()),
        }
    }

    fn local_pom(&self) -> Option<PathBuf> {
        let project = self.project.as_deref()?;
        let pom = if project.is_file() {
            project.to_path_buf()
        } else {
            project.join("pom.xml")
        };
        pom.is_file().then_some(pom)
    }
}

/// Normalises a declared Java version to its feature release.
///
/// Returns `None` for property references and values that are not versions.
#[must_use]
pub fn normalize_java_version(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value.contains("${") {
        return None;
    }

    let value = value.strip_prefix("1.").unwrap_or(value);
    let feature = value.split(['.', '-', '+', '_']).next()?;
    if feature.is_empty() || !feature.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(feature.trim_start_matches('0').to_string()).filter(|v| !v.is_empty())
}

/// Runs the rules over a descriptor, skipping XML comments.
#[must_use]
pub fn java_version_from_pom(xml: &str) -> Option<(String, &'static str)> {
    let xml = strip_comments(xml);
    RULES
        .iter()
        .find_map(|rule| rule.apply(&xml).map(|version| (version, rule.tag)))
}

fn strip_comments(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Discovers the Java version a project needs.
///
/// A local `pom.xml` takes precedence; the remote URL is only fetched when no
/// local file exists.
pub async fn discover_java_version(query: &JavaVersionQuery) -> DiscoveredJavaVersion {
    if let Some(pom) = query.local_pom() {
        return match tokio::fs::read_to_string(&pom).await {
            Ok(xml) => match java_version_from_pom(&xml) {
                Some((version, rule)) => {
                    tracing::debug!(pom = %pom.display(), version, rule, "java version discovered");
                    DiscoveredJavaVersion {
                        version,
                        source: VersionSource::Local(pom),
                        rule: Some(rule),
                    }
                }
                None => DiscoveredJavaVersion::fallback(),
            },
            Err(e) => {
                tracing::warn!(pom = %pom.display(), error = %e, "failed to read pom.xml");
                DiscoveredJavaVersion::fallback()
            }
        };
    }

    if let Some(url) = &query.pom_url {
        match fetch_remote(url).await {
            Ok(xml) => {
                if let Some((version, rule)) = java_version_from_pom(&xml) {
                    return DiscoveredJavaVersion {
                        version,
                        source: VersionSource::Remote(url.clone()),
                        rule: Some(rule),
                    };
                }
            }
            Err(e) => tracing::warn!(url, error = %e, "failed to fetch remote pom.xml"),
        }
    }

    DiscoveredJavaVersion::fallback()
}

async fn fetch_remote(url: &str) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(REMOTE_FETCH_TIMEOUT)
        .build()?;
    client.get(url).send().await?.error_for_status()?.text().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pom(properties: &str) -> String {
        format!(
            "<project>\n  <modelVersion>4.0.0</modelVersion>\n  <properties>\n{properties}\n  </properties>\n</project>\n"
        )
    }

    #[test]
    fn normalizes_legacy_and_full_versions() {
        assert_eq!(normalize_java_version("1.8").as_deref(), Some("8"));
        assert_eq!(normalize_java_version(" 17.0.2 ").as_deref(), Some("17"));
        assert_eq!(normalize_java_version("21").as_deref(), Some("21"));
        assert_eq!(normalize_java_version("11-ea").as_deref(), Some("11"));
        assert_eq!(normalize_java_version("${java.version}"), None);
        assert_eq!(normalize_java_version("latest"), None);
        assert_eq!(normalize_java_version(""), None);
    }

    #[test]
    fn java_version_wins_over_compiler_properties() {
        let xml = pom(
            "<maven.compiler.source>11</maven.compiler.source>\n<java.version>21</java.version>",
        );
        assert_eq!(
            java_version_from_pom(&xml),
            Some(("21".to_string(), "java.version"))
        );
    }

    #[test]
    fn release_wins_over_source() {
        let xml = pom(
            "<maven.compiler.source>1.8</maven.compiler.source>\n<maven.compiler.release>11</maven.compiler.release>",
        );
        assert_eq!(
            java_version_from_pom(&xml),
            Some(("11".to_string(), "maven.compiler.release"))
        );
    }

    #[test]
    fn property_reference_falls_through_to_next_rule() {
        let xml = pom(
            "<java.version>${jdk}</java.version>\n<maven.compiler.source>1.8</maven.compiler.source>",
        );
        assert_eq!(
            java_version_from_pom(&xml),
            Some(("8".to_string(), "maven.compiler.source"))
        );
    }

    #[test]
    fn commented_out_properties_are_ignored() {
        let xml = pom("<!-- <java.version>11</java.version> -->\n<java.version>17</java.version>");
        assert_eq!(
            java_version_from_pom(&xml).map(|(v, _)| v).as_deref(),
            Some("17")
        );
    }

    #[test]
    fn no_properties_yields_none() {
        assert_eq!(java_version_from_pom("<project/>"), None);
    }

    #[tokio::test]
    async fn local_pom_is_read_from_directory() {
        let dir = std::env::temp_dir().join(format!("devrt_discovery_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        std::fs::write(dir.join("pom.xml"), pom("<java.version>11</java.version>"))
            .expect("Should write pom");

        let found = discover_java_version(&JavaVersionQuery::local(&dir)).await;
        assert_eq!(found.version, "11");
        assert_eq!(found.source, VersionSource::Local(dir.join("pom.xml")));
        assert_eq!(found.rule, Some("java.version"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_descriptor_falls_back_to_default() {
        let dir = std::env::temp_dir().join("devrt_discovery_no_such_project");
        let found = discover_java_version(&JavaVersionQuery::local(&dir)).await;
        assert_eq!(found.version, DEFAULT_JAVA_VERSION);
        assert_eq!(found.source, VersionSource::Fallback);
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_default() {
        let query = JavaVersionQuery::remote("http://127.0.0.1:9/pom.xml");
        let found = discover_java_version(&query).await;
        assert_eq!(found.version, DEFAULT_JAVA_VERSION);
        assert_eq!(found.source, VersionSource::Fallback);
        assert_eq!(found.rule, None);
    }
}
