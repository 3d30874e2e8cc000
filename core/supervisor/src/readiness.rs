//! Readiness and port-conflict detection on unstructured output.
//!
//! Development servers do not signal readiness; they print something. A
//! [`ReadinessDetector`] holds an ordered list of regular expressions and is
//! fed every chunk and every completed line from both output streams. ANSI
//! colour sequences are stripped before matching since both Angular and
//! Spring colour their banners.

use regex::Regex;

use crate::errors::StartError;

/// Readiness patterns of `ng serve` across Angular CLI 15 to 19.
pub const ANGULAR_READY_PATTERNS: &[&str] = &[
    r"Compiled successfully",
    r"Local:\s+https?://",
    r"Application bundle generation complete",
];

/// Readiness patterns of a Spring Boot application.
pub const SPRING_READY_PATTERNS: &[&str] = &[
    r"Started \w+ in [\d.]+ seconds",
    r"Tomcat started on port",
    r"Netty started on port",
];

/// Compiled readiness patterns.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    patterns: Vec<Regex>,
}

impl ReadinessDetector {
    /// Compiles patterns, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::InvalidPattern`] for the first pattern that does
    /// not compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, StartError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern.as_ref()).map_err(|source| StartError::InvalidPattern {
                    pattern: pattern.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether there is nothing to wait for; the process is ready once spawned.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Index of the first pattern matching `text`.
    #[must_use]
    pub fn first_match(&self, text: &str) -> Option<usize> {
        let text = strip_ansi(text);
        self.patterns.iter().position(|p| p.is_match(&text))
    }
}

/// Whether output says the listening port is taken.
///
/// Covers Node (`EADDRINUSE`), the Angular CLI, Spring Boot and the generic
/// OS error text.
#[must_use]
pub fn is_port_conflict(text: &str) -> bool {
    let text = strip_ansi(text).to_ascii_lowercase();
    text.contains("eaddrinuse")
        || text.contains("address already in use")
        || text.contains("web server failed to start. port")
        || (text.contains("port ") && text.contains(" is already in use"))
}

/// Removes ANSI CSI escape sequences (`ESC [ ... final`).
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if ('@'..='~').contains(&next) {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}
