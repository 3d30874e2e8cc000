//! Progress and log notifications emitted by the installer.
//!
//! The core never prints. Callers hand in an [`EventSink`] and decide how to
//! render what happened; the CLI prints lines, a GUI would update widgets.

use std::sync::Arc;

/// Something the installer wants the caller to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Coarse progress of the current step.
    Progress {
        /// Percentage when the total is known.
        percent: Option<u8>,
        /// Short status text such as `"Downloading node 20.18.0"`.
        status: String,
    },
    /// A line of narration or tool output.
    Log {
        /// The message text.
        message: String,
        /// Whether the line came from an error stream or describes a failure.
        is_error: bool,
    },
}

impl Event {
    /// Creates an informational log event.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            is_error: false,
        }
    }

    /// Creates an error log event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            is_error: true,
        }
    }

    /// Creates a progress event.
    #[must_use]
    pub fn progress(percent: Option<u8>, status: impl Into<String>) -> Self {
        Self::Progress {
            percent,
            status: status.into(),
        }
    }
}

/// Callback receiving [`Event`]s.
///
/// Invoked synchronously on the task that caused the event, so it must not
/// block for long.
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;

/// Returns a sink that drops every event.
#[must_use]
pub fn discard() -> EventSink {
    Arc::new(|_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn constructors_set_error_flag() {
        assert_eq!(
            Event::info("hello"),
            Event::Log {
                message: "hello".to_string(),
                is_error: false
            }
        );
        assert!(matches!(Event::error("bad"), Event::Log { is_error: true, .. }));
    }

    #[test]
    fn sink_receives_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: EventSink = Arc::new(move |event| seen_clone.lock().unwrap().push(event));

        sink(Event::progress(Some(10), "Downloading"));
        sink(Event::info("done"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], Event::Progress { percent: Some(10), .. }));
    }
}
