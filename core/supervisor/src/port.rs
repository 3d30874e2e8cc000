//! Port reclamation.
//!
//! Before a development server starts, whatever still listens on its port
//! (usually an orphan from a previous session) is terminated. This is
//! best-effort: a missing listing tool, an unparsable listing or a failed kill
//! is logged and otherwise ignored.

use std::collections::BTreeSet;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::terminate::{self, Target};

/// Grace period given to a foreign listener before it is killed.
#[cfg(unix)]
const RECLAIM_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Terminates every process listening on TCP `port`, except this one.
///
/// Returns the number of processes a termination was attempted on. Zero when
/// the port is free or the listeners cannot be determined.
pub async fn free_port(port: u16) -> usize {
    let pids = match listeners(port).await {
        Ok(pids) => pids,
        Err(e) => {
            warn!(port, error = %e, "could not list port owners");
            return 0;
        }
    };
    let own = std::process::id();
    let pids: Vec<u32> = pids.into_iter().filter(|pid| *pid != own).collect();
    if pids.is_empty() {
        debug!(port, "port is free");
        return 0;
    }

    info!(port, ?pids, "reclaiming port");
    join_all(pids.iter().map(|pid| reclaim(*pid))).await;
    pids.len()
}

#[cfg(unix)]
async fn reclaim(pid: u32) {
    let target = Target::for_pid(pid);
    let gone = terminate::terminate(target, RECLAIM_GRACE, terminate::wait_until_gone(pid)).await;
    if !gone {
        warn!(pid, "port owner survived termination");
    }
}

#[cfg(windows)]
async fn reclaim(pid: u32) {
    if let Err(e) = terminate::signal(Target::Process(pid), terminate::Strength::Forced).await {
        warn!(pid, error = %e, "failed to terminate port owner");
    }
}

#[cfg(unix)]
async fn listeners(port: u16) -> std::io::Result<BTreeSet<u32>> {
    let Ok(lsof) = which::which("lsof") else {
        debug!("lsof not found, skipping port reclamation");
        return Ok(BTreeSet::new());
    };
    let output = tokio::process::Command::new(lsof)
        .args(["-nP", "-t", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
        .output()
        .await?;
    // lsof exits 1 when nothing matched.
    if !output.status.success() && !output.stdout.is_empty() {
        debug!(code = ?output.status.code(), "lsof reported failure");
    }
    Ok(parse_lsof_pids(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(windows)]
async fn listeners(port: u16) -> std::io::Result<BTreeSet<u32>> {
    let output = tokio::process::Command::new("netstat")
        .args(["-ano", "-p", "tcp"])
        .output()
        .await?;
    Ok(parse_netstat_listeners(
        &String::from_utf8_lossy(&output.stdout),
        port,
    ))
}

/// Parses `lsof -t` output: one pid per line.
#[must_use]
pub fn parse_lsof_pids(text: &str) -> BTreeSet<u32> {
    text.lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Parses `netstat -ano` output for LISTENING rows bound to `port`.
///
/// ```text
///   Proto  Local Address          Foreign Address        State           PID
///   TCP    0.0.0.0:4200           0.0.0.0:0              LISTENING       9132
/// ```
#[must_use]
pub fn parse_netstat_listeners(text: &str, port: u16) -> BTreeSet<u32> {
    let suffix = format!(":{port}");
    text.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if let [proto, local, _foreign, state, pid] = cols.as_slice()
                && proto.eq_ignore_ascii_case("tcp")
                && state.eq_ignore_ascii_case("listening")
                && local.ends_with(&suffix)
            {
                pid.parse().ok()
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsof_output_is_deduplicated() {
        let pids = parse_lsof_pids("4121\n4122\n4121\n\n");
        assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![4121, 4122]);
    }

    #[test]
    fn netstat_rows_match_exact_port() {
        let text = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:4200           0.0.0.0:0              LISTENING       9132
  TCP    [::]:4200              [::]:0                 LISTENING       9132
  TCP    0.0.0.0:42000          0.0.0.0:0              LISTENING       7000
  TCP    127.0.0.1:4200         127.0.0.1:53001        ESTABLISHED     9132
  TCP    127.0.0.1:8080         0.0.0.0:0              LISTENING       5110
";
        let pids = parse_netstat_listeners(text, 4200);
        assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![9132]);
        assert!(parse_netstat_listeners(text, 9999).is_empty());
    }

    #[tokio::test]
    async fn free_port_on_unused_port_terminates_nothing() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Should bind");
            listener.local_addr().expect("Should have addr").port()
        };
        assert_eq!(free_port(port).await, 0);
    }

    #[tokio::test]
    async fn own_listener_is_not_reclaimed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Should bind");
        let port = listener.local_addr().expect("Should have addr").port();
        assert_eq!(free_port(port).await, 0);
        drop(listener);
    }

    /// Spawns `python3` listening on `port` as its own process group leader.
    #[cfg(unix)]
    async fn foreign_listener(port: u16) -> tokio::process::Child {
        let program = format!(
            "import socket, time\n\
             s = socket.socket()\n\
             s.setsockopt(socket.SOL_SOCKET, socket.SO_REUSEADDR, 1)\n\
             s.bind(('127.0.0.1', {port}))\n\
             s.listen()\n\
             time.sleep(60)\n"
        );
        let child = tokio::process::Command::new("python3")
            .args(["-c", &program])
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .expect("Should spawn listener");

        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while std::net::TcpStream::connect(("127.0.0.1", port)).is_err() {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("Listener should come up");
        child
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn foreign_listener_is_terminated() {
        if which::which("lsof").is_err() || which::which("python3").is_err() {
            eprintln!("skipping: lsof or python3 not available");
            return;
        }
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Should bind");
            listener.local_addr().expect("Should have addr").port()
        };
        let mut child = foreign_listener(port).await;

        // Reap concurrently so the exited listener does not linger as a zombie.
        let (reclaimed, status) = tokio::join!(free_port(port), async {
            tokio::time::timeout(std::time::Duration::from_secs(10), child.wait()).await
        });
        assert_eq!(reclaimed, 1);
        let status = status
            .expect("Listener should exit")
            .expect("Should collect exit status");
        assert!(!status.success());
        assert!(std::net::TcpStream::connect(("127.0.0.1", port)).is_err());
        assert_eq!(free_port(port).await, 0);
    }
}
