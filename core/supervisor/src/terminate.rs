//! Termination of process trees.
//!
//! Development servers fork workers (`ng serve` runs esbuild, Maven forks the
//! application JVM), so stopping only the direct child leaves the port held.
//! Supervised processes are started as process-group leaders on Unix and the
//! whole group is signalled. On Windows `taskkill /T` walks the tree.
//!
//! Termination is graceful first: SIGTERM (or `taskkill /T`), a grace period,
//! then SIGKILL (or `taskkill /T /F`).

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

/// How long to wait for exit after the forced kill.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Poll interval when waiting for a process that is not our child.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What to signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The process group led by this pid.
    Group(u32),
    /// A single process (and, on Windows, its descendants).
    Process(u32),
}

impl Target {
    /// Picks [`Target::Group`] if `pid` leads its own process group.
    #[must_use]
    pub fn for_pid(pid: u32) -> Self {
        #[cfg(unix)]
        {
            let nix_pid = nix::unistd::Pid::from_raw(raw_pid(pid));
            if nix::unistd::getpgid(Some(nix_pid)).is_ok_and(|pgid| pgid == nix_pid) {
                return Self::Group(pid);
            }
        }
        Self::Process(pid)
    }

    /// The pid this target refers to.
    #[must_use]
    pub fn pid(self) -> u32 {
        match self {
            Self::Group(pid) | Self::Process(pid) => pid,
        }
    }
}

/// Signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    /// SIGTERM / `taskkill /T`.
    Graceful,
    /// SIGKILL / `taskkill /T /F`.
    Forced,
}

#[cfg(unix)]
#[allow(clippy::cast_possible_wrap)]
fn raw_pid(pid: u32) -> i32 {
    pid as i32
}

/// Sends a termination signal. A target that no longer exists is not an error.
///
/// # Errors
///
/// Returns the OS error if the signal could not be delivered.
#[cfg(unix)]
pub async fn signal(target: Target, strength: Strength) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let sig = match strength {
        Strength::Graceful => Signal::SIGTERM,
        Strength::Forced => Signal::SIGKILL,
    };
    let result = match target {
        Target::Group(pgid) => signal::killpg(Pid::from_raw(raw_pid(pgid)), sig),
        Target::Process(pid) => signal::kill(Pid::from_raw(raw_pid(pid)), sig),
    };

    match result {
        Ok(()) => {
            debug!(?target, %sig, "signal sent");
            Ok(())
        }
        Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(std::io::Error::from(errno)),
    }
}

/// Sends a termination signal. A target that no longer exists is not an error.
///
/// # Errors
///
/// Returns an error if `taskkill` cannot be run.
#[cfg(windows)]
pub async fn signal(target: Target, strength: Strength) -> std::io::Result<()> {
    let pid = target.pid().to_string();
    let mut cmd = tokio::process::Command::new("taskkill");
    cmd.args(["/PID", &pid, "/T"]);
    if strength == Strength::Forced {
        cmd.arg("/F");
    }
    let output = cmd.output().await?;
    if !output.status.success() {
        // 128: no such process.
        debug!(
            ?target,
            code = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "taskkill reported failure"
        );
    }
    Ok(())
}

/// Whether a process exists. Only meaningful for processes that are not our
/// unreaped children.
#[cfg(unix)]
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw_pid(pid)), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Whether a process exists.
#[cfg(windows)]
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

/// Resolves once `pid` no longer exists.
pub async fn wait_until_gone(pid: u32) {
    while is_alive(pid) {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Terminates a target, escalating to a forced kill after `grace`.
///
/// `exited` must resolve when the process is gone. Returns whether exit was
/// observed.
pub async fn terminate<F>(target: Target, grace: Duration, exited: F) -> bool
where
    F: Future<Output = ()>,
{
    tokio::pin!(exited);

    if let Err(e) = signal(target, Strength::Graceful).await {
        warn!(?target, error = %e, "failed to send graceful termination");
    }
    if tokio::time::timeout(grace, &mut exited).await.is_ok() {
        return true;
    }

    info!(?target, grace_secs = grace.as_secs_f32(), "still running after grace period, killing");
    if let Err(e) = signal(target, Strength::Forced).await {
        warn!(?target, error = %e, "failed to kill");
    }
    tokio::time::timeout(KILL_WAIT, &mut exited).await.is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[tokio::test]
    async fn group_leader_is_detected() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .stdout(Stdio::null())
            .spawn()
            .expect("Should spawn sleep");
        let pid = child.id().expect("Should have pid");

        assert_eq!(Target::for_pid(pid), Target::Group(pid));
        assert_eq!(Target::for_pid(std::process::id()).pid(), std::process::id());

        let stopped = terminate(Target::Group(pid), Duration::from_secs(5), async {
            let _ = child.wait().await;
        })
        .await;
        assert!(stopped);
    }

    #[tokio::test]
    async fn ignoring_sigterm_escalates_to_kill() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "trap '' TERM; while true; do sleep 0.1; done"])
            .process_group(0)
            .spawn()
            .expect("Should spawn sh");
        let pid = child.id().expect("Should have pid");

        // Give the shell time to install its trap.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let started = std::time::Instant::now();
        let stopped = terminate(Target::Group(pid), Duration::from_millis(500), async {
            let _ = child.wait().await;
        })
        .await;
        assert!(stopped);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn signalling_missing_process_is_ok() {
        // Reap a short-lived child so its pid is free.
        let mut child = tokio::process::Command::new("true")
            .spawn()
            .expect("Should spawn true");
        let pid = child.id().expect("Should have pid");
        let _ = child.wait().await;

        assert!(signal(Target::Process(pid), Strength::Graceful).await.is_ok());
        assert!(!is_alive(pid));
    }
}
