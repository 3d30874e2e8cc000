//! Terminal rendering of installer and supervisor events.
//!
//! Narration goes to stdout, errors and progress to stderr. Download progress
//! arrives every 100 ms; only the first update of each step and every tenth
//! percent are printed so logs stay readable when redirected.

use std::sync::{Arc, Mutex};

use devrt_runtime::events::{Event, EventSink};
use devrt_supervisor::{OutputStream, SupervisorEvent, SupervisorSink};
use tokio::sync::mpsc;

#[derive(Default)]
struct ProgressState {
    step: String,
    decile: Option<u8>,
}

impl ProgressState {
    /// Whether a progress update is worth printing.
    fn should_print(&mut self, percent: Option<u8>, status: &str) -> bool {
        let step = status.split(':').next().unwrap_or(status);
        let decile = percent.map(|p| p / 10);
        if step != self.step {
            self.step = step.to_string();
            self.decile = decile;
            return true;
        }
        if decile.is_some() && decile != self.decile {
            self.decile = decile;
            return true;
        }
        false
    }
}

/// Sink printing installer events.
pub fn install_sink() -> EventSink {
    let state = Mutex::new(ProgressState::default());
    Arc::new(move |event| match event {
        Event::Progress { percent, status } => {
            let print = state
                .lock()
                .map(|mut state| state.should_print(percent, &status))
                .unwrap_or(true);
            if print {
                match percent {
                    Some(p) => eprintln!("[{p:>3}%] {status}"),
                    None => eprintln!("       {status}"),
                }
            }
        }
        Event::Log {
            message,
            is_error: false,
        } => println!("{message}"),
        Event::Log {
            message,
            is_error: true,
        } => eprintln!("{message}"),
    })
}

/// Sink printing supervisor events, prefixed with the project name.
///
/// Exit codes are forwarded to `exits` together with the pid that exited.
pub fn supervisor_sink(exits: mpsc::UnboundedSender<(u32, Option<i32>)>) -> SupervisorSink {
    Arc::new(move |event| match event {
        SupervisorEvent::Output {
            project,
            stream: OutputStream::Stdout,
            line,
        } => println!("[{project}] {line}"),
        SupervisorEvent::Output {
            project,
            stream: OutputStream::Stderr,
            line,
        } => eprintln!("[{project}] {line}"),
        SupervisorEvent::Notice { project, message } => eprintln!("[{project}] {message}"),
        SupervisorEvent::Ready { project, pid, port } => match port {
            Some(port) => eprintln!("[{project}] ready on port {port} (pid {pid})"),
            None => eprintln!("[{project}] ready (pid {pid})"),
        },
        SupervisorEvent::Exited { project, pid, code } => {
            match code {
                Some(code) => eprintln!("[{project}] exited with code {code}"),
                None => eprintln!("[{project}] terminated by signal"),
            }
            let _ = exits.send((pid, code));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_thinned_to_deciles() {
        let mut state = ProgressState::default();
        assert!(state.should_print(Some(0), "Downloading node 20.18.0 (linux-x64)"));
        assert!(!state.should_print(Some(3), "Downloading node 20.18.0 (linux-x64): 1.0 MB (2.0 MB/s)"));
        assert!(state.should_print(Some(12), "Downloading node 20.18.0 (linux-x64): 4.0 MB (2.0 MB/s)"));
        assert!(!state.should_print(Some(19), "Downloading node 20.18.0 (linux-x64): 6.0 MB (2.0 MB/s)"));
        assert!(state.should_print(None, "Extracting node 20.18.0 (linux-x64)"));
        assert!(!state.should_print(None, "Extracting node 20.18.0 (linux-x64)"));
    }

    #[test]
    fn unknown_total_prints_once_per_step() {
        let mut state = ProgressState::default();
        assert!(state.should_print(None, "Downloading jdk 17 (linux-x64): 1.0 MB (1.0 MB/s)"));
        assert!(!state.should_print(None, "Downloading jdk 17 (linux-x64): 2.0 MB (1.0 MB/s)"));
    }
}
