#![warn(clippy::pedantic)]

//! Integration tests for the devrt CLI.
//!
//! These tests spawn the compiled `devrt` binary and check its behavior
//! through stdout, stderr and exit codes.
//!
//! ## Test Strategy
//!
//! 1. **Catalog**: `versions` listing and filtering
//! 2. **Local state**: `list`, `uninstall` and `java-version` on an isolated base directory
//! 3. **Install errors**: unknown versions, unreachable mirrors, unknown archive formats
//! 4. **Supervision**: `start exec` readiness, exit code mirroring and project env
//!
//! Every test passes `--home` with a temporary directory so nothing is read
//! from or written to a real base directory. No test needs network access:
//! mirrors are pointed at a closed local port.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p devrt
//! ```

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

/// Resolves the path to a test fixture file in the `tests/fixtures/` directory.
fn fixture_file(name: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A `devrt` command rooted at `home`.
fn devrt(home: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("devrt"));
    cmd.arg("--home").arg(home.path());
    cmd.env_remove("DEVRT_HOME").env_remove("RUST_LOG");
    cmd
}

// -----------------------------------------------------------------------------
// Help and Catalog
// -----------------------------------------------------------------------------

#[test]
fn help_lists_commands() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("devrt"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("versions"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("free-port"))
        .stdout(predicate::str::contains("DEVRT_HOME"));
}

/// Node versions are listed with the Angular CLI paired to them.
#[test]
fn versions_lists_node_with_companion() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .arg("versions")
        .assert()
        .success()
        .stdout(predicate::str::contains("node"))
        .stdout(predicate::str::contains("20.18.0"))
        .stdout(predicate::str::contains("@angular/cli"))
        .stdout(predicate::str::contains("jdk"))
        .stdout(predicate::str::contains("maven"));
}

#[test]
fn versions_filters_by_kind() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .arg("versions")
        .arg("jdk")
        .assert()
        .success()
        .stdout(predicate::str::contains("jdk"))
        .stdout(predicate::str::contains("21"))
        .stdout(predicate::str::contains("@angular/cli").not());
}

#[test]
fn versions_rejects_unknown_kind() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .arg("versions")
        .arg("python")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown runtime kind"));
}

// -----------------------------------------------------------------------------
// Local State
// -----------------------------------------------------------------------------

#[test]
fn list_on_empty_home() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runtimes installed."));
}

#[test]
fn uninstall_missing_runtime_fails() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .args(["uninstall", "node", "1.2.3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("node 1.2.3 is not installed."));
}

/// Commented-out properties are ignored and `java.version` wins over the
/// compiler properties.
#[test]
fn java_version_reads_pom() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .arg("java-version")
        .arg(fixture_file("pom.xml"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("21 (java.version in"));
}

#[test]
fn java_version_defaults_without_pom() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");
    let project = temp.child("empty-project");
    project.create_dir_all().expect("Should create project dir");

    devrt(&temp)
        .arg("java-version")
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("17 (default)"));
}

#[test]
fn free_port_on_unused_port() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Should bind");
        listener.local_addr().expect("Should have address").port()
    };

    devrt(&temp)
        .arg("free-port")
        .arg(port.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Port {port} is free.")));
}

// -----------------------------------------------------------------------------
// Install Errors
// -----------------------------------------------------------------------------

#[test]
fn install_unknown_node_version() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .args(["install", "node", "99.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node version: 99.0.0"));
}

#[test]
fn install_without_network_shows_error() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .env("DEVRT_NODE_MIRROR", "http://127.0.0.1:9")
        .args(["install", "node", "--skip-companion"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to download"));

    temp.child("node").child("20.18.0").assert(predicate::path::missing());
}

#[test]
fn install_custom_needs_archive_format() {
    let temp = assert_fs::TempDir::new().expect("Should create temp dir");

    devrt(&temp)
        .args(["install", "custom", "jdk", "21-corp", "http://127.0.0.1:9/download"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot tell the archive format"));
}

// -----------------------------------------------------------------------------
// Supervision
// -----------------------------------------------------------------------------

#[cfg(unix)]
mod start {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn ready_then_clean_exit() {
        let temp = assert_fs::TempDir::new().expect("Should create temp dir");

        devrt(&temp)
            .args(["start", "exec", "demo", "--dir"])
            .arg(temp.path())
            .args(["--ready", "READY", "--", "sh", "-c", "echo READY; sleep 0.2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[demo] READY"))
            .stderr(predicate::str::contains("[demo] ready"));
    }

    #[test]
    #[serial]
    fn failure_before_ready_mirrors_exit_code() {
        let temp = assert_fs::TempDir::new().expect("Should create temp dir");

        devrt(&temp)
            .args(["start", "exec", "demo", "--dir"])
            .arg(temp.path())
            .args(["--ready", "READY", "--", "sh", "-c", "echo booting; exit 4"])
            .assert()
            .code(4)
            .stdout(predicate::str::contains("[demo] booting"))
            .stderr(predicate::str::contains("failed to start (exit code 4)"));
    }

    #[test]
    #[serial]
    fn clean_exit_without_readiness_is_finished() {
        let temp = assert_fs::TempDir::new().expect("Should create temp dir");

        devrt(&temp)
            .args(["start", "exec", "demo", "--dir"])
            .arg(temp.path())
            .args(["--ready", "READY", "--", "sh", "-c", "echo one-shot"])
            .assert()
            .success()
            .stderr(predicate::str::contains("[demo] finished"));
    }

    #[test]
    #[serial]
    fn project_env_is_applied() {
        let temp = assert_fs::TempDir::new().expect("Should create temp dir");
        temp.child("projects.toml")
            .write_file(&fixture_file("projects.toml"))
            .expect("Should copy project store");

        devrt(&temp)
            .args(["start", "exec", "docs", "--dir"])
            .arg(temp.path())
            .args(["--", "sh", "-c", "echo \"$GREETING\""])
            .assert()
            .success()
            .stdout(predicate::str::contains("[docs] hello from store"));
    }

    #[test]
    fn missing_directory_is_reported() {
        let temp = assert_fs::TempDir::new().expect("Should create temp dir");

        devrt(&temp)
            .args(["start", "exec", "demo", "--dir"])
            .arg(temp.path().join("nowhere"))
            .args(["--", "true"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Project directory not found"));
    }
}
