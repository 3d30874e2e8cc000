//! The process supervisor.
//!
//! A [`Supervisor`] owns every process it starts. Each project name maps to at
//! most one live process. Starting a project walks through:
//!
//! 1. mark the project as starting and stop its current process, if any;
//! 2. reclaim the target port;
//! 3. consult the cancellation marks, then spawn in a new process group;
//! 4. stream output to the event sink until a readiness pattern matches, the
//!    output reports a port conflict, or the process exits.
//!
//! A port conflict before readiness kills the process and launches it again,
//! up to [`SupervisorConfig::port_conflict_retries`] times.
//!
//! ## Concurrency
//!
//! The registry of handles, cancellation marks and states sits behind one
//! async mutex. Start attempts of the same project are serialised by a
//! per-project gate. Each process has a single monitor task that reads both
//! pipes and waits for exit, so output of one project arrives in order and
//! the `Exited` event is the last one of an attempt.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use futures_util::future::join_all;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tracing::{debug, info, warn};

use crate::errors::StartError;
use crate::launch::LaunchSpec;
use crate::line_buffer::LineBuffer;
use crate::port;
use crate::readiness::{ReadinessDetector, is_port_conflict};
use crate::terminate::{self, Target};

/// How long output is still read after the process exited. Grandchildren may
/// hold the pipes open indefinitely.
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8 * 1024;

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Tunables of a [`Supervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Time between the graceful and the forced termination.
    pub grace_period: Duration,
    /// Relaunches after a port conflict before giving up.
    pub port_conflict_retries: u32,
    /// Whether to terminate whatever holds the port before each launch.
    pub reclaim_ports: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            port_conflict_retries: 1,
            reclaim_ports: true,
        }
    }
}

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Something a supervised project did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// One complete line of output.
    Output {
        project: String,
        stream: OutputStream,
        line: String,
    },
    /// Narration from the supervisor itself.
    Notice { project: String, message: String },
    /// A readiness pattern matched.
    Ready {
        project: String,
        pid: u32,
        port: Option<u16>,
    },
    /// The process exited. `code` is `None` when killed by a signal.
    Exited {
        project: String,
        pid: u32,
        code: Option<i32>,
    },
}

/// Receiver of [`SupervisorEvent`]s, called synchronously from monitor tasks.
pub type SupervisorSink = Arc<dyn Fn(SupervisorEvent) + Send + Sync>;

/// A project whose process is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProject {
    pub project: String,
    pub pid: u32,
    pub port: Option<u16>,
    pub runtime_version: Option<String>,
    pub started_at: SystemTime,
}

/// How a successful start ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The process is up and stays under supervision.
    Ready(RunningProject),
    /// The process exited with code 0 before becoming ready.
    Completed,
}

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Cancelling,
}

/// What the monitor observed first.
#[derive(Debug)]
enum Attempt {
    Ready(RunningProject),
    PortConflict,
    Exited(Option<i32>),
}

struct Handle {
    info: RunningProject,
    generation: u64,
    exited: watch::Receiver<bool>,
}

#[derive(Default)]
struct Registry {
    handles: HashMap<String, Handle>,
    cancelled: HashSet<String>,
    states: HashMap<String, ProjectState>,
}

impl Registry {
    fn set_state(&mut self, project: &str, state: ProjectState) {
        if state == ProjectState::Idle {
            self.states.remove(project);
        } else {
            self.states.insert(project.to_string(), state);
        }
    }

    fn state(&self, project: &str) -> ProjectState {
        self.states.get(project).copied().unwrap_or_default()
    }

    fn take_handle(&mut self, project: &str, generation: u64) -> Option<Handle> {
        if self.handles.get(project)?.generation == generation {
            self.handles.remove(project)
        } else {
            None
        }
    }
}

struct Inner {
    config: SupervisorConfig,
    events: SupervisorSink,
    registry: Mutex<Registry>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    generation: AtomicU64,
}

impl Inner {
    fn emit(&self, event: SupervisorEvent) {
        (self.events)(event);
    }

    fn notice(&self, project: &str, message: impl Into<String>) {
        self.emit(SupervisorEvent::Notice {
            project: project.to_string(),
            message: message.into(),
        });
    }
}

/// Supervises developer processes. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Launched {
    pid: u32,
    generation: u64,
    outcome: oneshot::Receiver<Attempt>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig, events: SupervisorSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                events,
                registry: Mutex::new(Registry::default()),
                gates: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Starts a project and waits until it is ready or has exited.
    ///
    /// # Errors
    ///
    /// - [`StartError::InvalidPattern`] if a readiness pattern does not compile
    /// - [`StartError::Cancelled`] if [`Supervisor::cancel`] was called meanwhile
    /// - [`StartError::Spawn`] if the program cannot be started
    /// - [`StartError::StartFailed`] if it exits with a failure before readiness
    /// - [`StartError::PortConflict`] if the port stays taken through every retry
    pub async fn start(&self, spec: LaunchSpec) -> Result<StartOutcome, StartError> {
        let detector = ReadinessDetector::new(&spec.readiness)?;
        let gate = self.gate(&spec.project).await;
        let result = {
            let _guard = gate.lock().await;
            self.start_exclusive(&spec, &detector).await
        };
        self.release_gate(&spec.project, gate).await;
        result
    }

    /// Body of [`Supervisor::start`], run while holding the project's gate.
    async fn start_exclusive(
        &self,
        spec: &LaunchSpec,
        detector: &ReadinessDetector,
    ) -> Result<StartOutcome, StartError> {
        // Starting is set before the old instance goes down, so a cancel that
        // arrives while it is being stopped marks this start.
        let has_handle = {
            let mut registry = self.inner.registry.lock().await;
            registry.cancelled.remove(&spec.project);
            registry.set_state(&spec.project, ProjectState::Starting);
            registry.handles.contains_key(&spec.project)
        };
        if has_handle {
            self.inner.notice(&spec.project, "stopping the running instance first");
            self.stop(&spec.project).await;
        }

        let result = self.attempt_start(spec, detector).await;

        if !matches!(result, Ok(StartOutcome::Ready(_))) {
            let mut registry = self.inner.registry.lock().await;
            if matches!(
                registry.state(&spec.project),
                ProjectState::Starting | ProjectState::Cancelling
            ) {
                registry.set_state(&spec.project, ProjectState::Idle);
            }
        }
        result
    }

    async fn attempt_start(
        &self,
        spec: &LaunchSpec,
        detector: &ReadinessDetector,
    ) -> Result<StartOutcome, StartError> {
        let project = spec.project.as_str();
        let max_attempts = self.inner.config.port_conflict_retries.saturating_add(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            if self.inner.config.reclaim_ports
                && let Some(port) = spec.port
            {
                let reclaimed = port::free_port(port).await;
                if reclaimed > 0 {
                    self.inner
                        .notice(project, format!("terminated {reclaimed} process(es) holding port {port}"));
                }
            }

            let launched = self.launch(spec, detector.clone()).await?;
            let attempt = launched.outcome.await.unwrap_or(Attempt::Exited(None));

            match attempt {
                Attempt::Ready(running) => return Ok(StartOutcome::Ready(running)),
                Attempt::PortConflict => {
                    let port_label = spec
                        .port
                        .map_or_else(|| "its port".to_string(), |p| format!("port {p}"));
                    if attempts >= max_attempts {
                        self.inner.notice(
                            project,
                            format!("{port_label} is still in use, giving up"),
                        );
                        self.halt(project, launched.generation).await;
                        return Err(StartError::PortConflict {
                            project: project.to_string(),
                            port: spec.port,
                            attempts,
                        });
                    }
                    self.inner.notice(
                        project,
                        format!("{port_label} is in use, restarting (attempt {} of {max_attempts})", attempts + 1),
                    );
                    info!(project, pid = launched.pid, "port conflict, relaunching");
                    self.halt(project, launched.generation).await;
                }
                Attempt::Exited(code) => {
                    let cancelled = self.inner.registry.lock().await.cancelled.remove(project);
                    if cancelled {
                        return Err(StartError::Cancelled {
                            project: project.to_string(),
                        });
                    }
                    if code == Some(0) {
                        return Ok(StartOutcome::Completed);
                    }
                    return Err(StartError::StartFailed {
                        project: project.to_string(),
                        exit_code: code,
                    });
                }
            }
        }
    }

    async fn launch(&self, spec: &LaunchSpec, detector: ReadinessDetector) -> Result<Launched, StartError> {
        let mut registry = self.inner.registry.lock().await;
        if registry.cancelled.remove(&spec.project) {
            debug!(project = %spec.project, "cancelled before spawn");
            return Err(StartError::Cancelled {
                project: spec.project.clone(),
            });
        }
        registry.set_state(&spec.project, ProjectState::Starting);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);

        let child = cmd.spawn().map_err(|source| StartError::Spawn {
            program: spec.program.display().to_string(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(project = %spec.project, pid, command = %spec.command_line(), "spawned");
        self.inner
            .notice(&spec.project, format!("started {} (pid {pid})", spec.command_line()));

        let running = RunningProject {
            project: spec.project.clone(),
            pid,
            port: spec.port,
            runtime_version: spec.runtime_version.clone(),
            started_at: SystemTime::now(),
        };
        let (exit_tx, exit_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        registry.handles.insert(
            spec.project.clone(),
            Handle {
                info: running.clone(),
                generation,
                exited: exit_rx,
            },
        );
        drop(registry);

        let monitor = Monitor {
            inner: Arc::clone(&self.inner),
            generation,
            detector,
            outcome: Some(outcome_tx),
            running,
            stdout_lines: LineBuffer::new(),
            stderr_lines: LineBuffer::new(),
        };
        tokio::spawn(monitor.run(child, exit_tx));

        Ok(Launched {
            pid,
            generation,
            outcome: outcome_rx,
        })
    }

    /// Stops a project's process tree: graceful termination, then a forced
    /// kill after the grace period.
    ///
    /// Returns whether the project is confirmed not running, which includes
    /// the case where nothing was running.
    pub async fn stop(&self, project: &str) -> bool {
        let handle = {
            let mut registry = self.inner.registry.lock().await;
            let Some(handle) = registry.handles.remove(project) else {
                return true;
            };
            if !matches!(
                registry.state(project),
                ProjectState::Starting | ProjectState::Cancelling
            ) {
                registry.set_state(project, ProjectState::Stopping);
            }
            handle
        };

        info!(project, pid = handle.info.pid, "stopping");
        let stopped = self.terminate_handle(handle).await;
        if !stopped {
            warn!(project, "process did not exit after being killed");
        }

        let mut registry = self.inner.registry.lock().await;
        if registry.state(project) == ProjectState::Stopping {
            registry.set_state(project, ProjectState::Idle);
        }
        stopped
    }

    /// Cancels a project. A project that is still starting is marked so its
    /// start reports [`StartError::Cancelled`]; either way it is stopped.
    pub async fn cancel(&self, project: &str) -> bool {
        {
            let mut registry = self.inner.registry.lock().await;
            if registry.state(project) == ProjectState::Starting {
                debug!(project, "marking for cancellation");
                registry.cancelled.insert(project.to_string());
                registry.set_state(project, ProjectState::Cancelling);
            }
        }
        self.stop(project).await
    }

    /// Stops every supervised project in parallel. Returns whether all of
    /// them are confirmed stopped.
    pub async fn stop_all(&self) -> bool {
        let projects: Vec<String> = self.inner.registry.lock().await.handles.keys().cloned().collect();
        join_all(projects.iter().map(|project| self.stop(project)))
            .await
            .into_iter()
            .all(|stopped| stopped)
    }

    /// Projects with a live process, sorted by name.
    pub async fn running(&self) -> Vec<RunningProject> {
        let registry = self.inner.registry.lock().await;
        let mut running: Vec<RunningProject> = registry.handles.values().map(|h| h.info.clone()).collect();
        running.sort_by(|a, b| a.project.cmp(&b.project));
        running
    }

    pub async fn state(&self, project: &str) -> ProjectState {
        self.inner.registry.lock().await.state(project)
    }

    async fn gate(&self, project: &str) -> Arc<Mutex<()>> {
        let mut gates = self.inner.gates.lock().await;
        Arc::clone(gates.entry(project.to_string()).or_default())
    }

    /// Drops the project's gate once no other start holds or awaits it.
    async fn release_gate(&self, project: &str, gate: Arc<Mutex<()>>) {
        let mut gates = self.inner.gates.lock().await;
        // The map and `gate` are the only references left.
        if Arc::strong_count(&gate) == 2 {
            gates.remove(project);
        }
        drop(gate);
    }

    /// Terminates one specific launch if it is still registered.
    async fn halt(&self, project: &str, generation: u64) {
        let handle = self.inner.registry.lock().await.take_handle(project, generation);
        if let Some(handle) = handle {
            self.terminate_handle(handle).await;
        }
    }

    async fn terminate_handle(&self, handle: Handle) -> bool {
        #[cfg(unix)]
        let target = Target::Group(handle.info.pid);
        #[cfg(windows)]
        let target = Target::Process(handle.info.pid);

        let mut exited = handle.exited;
        terminate::terminate(target, self.inner.config.grace_period, async move {
            let _ = exited.wait_for(|done| *done).await;
        })
        .await
    }
}

/// Reads a chunk. Pends forever once `reader` is gone; returns 0 and drops
/// the reader at end of stream.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut Option<R>, buf: &mut [u8]) -> usize {
    let Some(r) = reader.as_mut() else {
        return std::future::pending().await;
    };
    match r.read(buf).await {
        Ok(n) if n > 0 => n,
        Ok(_) => {
            *reader = None;
            0
        }
        Err(e) => {
            debug!(error = %e, "pipe read failed");
            *reader = None;
            0
        }
    }
}

/// Per-process task state.
struct Monitor {
    inner: Arc<Inner>,
    generation: u64,
    detector: ReadinessDetector,
    outcome: Option<oneshot::Sender<Attempt>>,
    running: RunningProject,
    stdout_lines: LineBuffer,
    stderr_lines: LineBuffer,
}

impl Monitor {
    async fn run(mut self, mut child: Child, exit_tx: watch::Sender<bool>) {
        if self.detector.is_immediate() {
            self.on_ready().await;
        }

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_buf = vec![0u8; READ_CHUNK];
        let mut err_buf = vec![0u8; READ_CHUNK];

        let status = loop {
            tokio::select! {
                n = read_chunk(&mut stdout, &mut out_buf) => {
                    self.on_chunk(OutputStream::Stdout, &out_buf[..n]).await;
                }
                n = read_chunk(&mut stderr, &mut err_buf) => {
                    self.on_chunk(OutputStream::Stderr, &err_buf[..n]).await;
                }
                status = child.wait() => break status,
            }
        };

        let drain = async {
            while stdout.is_some() || stderr.is_some() {
                tokio::select! {
                    n = read_chunk(&mut stdout, &mut out_buf) => {
                        self.on_chunk(OutputStream::Stdout, &out_buf[..n]).await;
                    }
                    n = read_chunk(&mut stderr, &mut err_buf) => {
                        self.on_chunk(OutputStream::Stderr, &err_buf[..n]).await;
                    }
                }
            }
        };
        if tokio::time::timeout(OUTPUT_DRAIN, drain).await.is_err() {
            debug!(project = %self.running.project, "output still open after exit");
        }
        self.on_chunk(OutputStream::Stdout, &[]).await;
        self.on_chunk(OutputStream::Stderr, &[]).await;

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(project = %self.running.project, error = %e, "failed to wait for process");
                None
            }
        };
        self.finish(code, &exit_tx).await;
    }

    /// Handles a chunk; an empty chunk flushes the stream's partial line.
    async fn on_chunk(&mut self, stream: OutputStream, chunk: &[u8]) {
        let buffer = match stream {
            OutputStream::Stdout => &mut self.stdout_lines,
            OutputStream::Stderr => &mut self.stderr_lines,
        };
        let lines = if chunk.is_empty() {
            buffer.flush().into_iter().collect()
        } else {
            buffer.push(chunk)
        };

        for line in &lines {
            self.inner.emit(SupervisorEvent::Output {
                project: self.running.project.clone(),
                stream,
                line: line.clone(),
            });
        }

        for line in &lines {
            if self.inspect(line).await {
                return;
            }
        }
        if !chunk.is_empty() {
            self.inspect(&String::from_utf8_lossy(chunk)).await;
        }
    }

    /// Tests output for conflict and readiness. Returns true once the attempt
    /// has an outcome.
    async fn inspect(&mut self, text: &str) -> bool {
        if self.outcome.is_none() {
            return true;
        }
        if is_port_conflict(text) {
            debug!(project = %self.running.project, "port conflict detected");
            if let Some(tx) = self.outcome.take() {
                let _ = tx.send(Attempt::PortConflict);
            }
            return true;
        }
        if let Some(index) = self.detector.first_match(text) {
            debug!(project = %self.running.project, pattern = index, "readiness pattern matched");
            self.on_ready().await;
            return true;
        }
        false
    }

    async fn on_ready(&mut self) {
        let Some(tx) = self.outcome.take() else {
            return;
        };
        let project = self.running.project.as_str();
        {
            let mut registry = self.inner.registry.lock().await;
            if registry
                .handles
                .get(project)
                .is_some_and(|h| h.generation == self.generation)
            {
                registry.set_state(project, ProjectState::Running);
                registry.cancelled.remove(project);
            }
        }
        info!(project, pid = self.running.pid, "ready");
        self.inner.emit(SupervisorEvent::Ready {
            project: project.to_string(),
            pid: self.running.pid,
            port: self.running.port,
        });
        let _ = tx.send(Attempt::Ready(self.running.clone()));
    }

    async fn finish(&mut self, code: Option<i32>, exit_tx: &watch::Sender<bool>) {
        let project = self.running.project.as_str();
        info!(project, pid = self.running.pid, ?code, "exited");
        self.inner.emit(SupervisorEvent::Exited {
            project: project.to_string(),
            pid: self.running.pid,
            code,
        });
        {
            let mut registry = self.inner.registry.lock().await;
            if registry.take_handle(project, self.generation).is_some()
                && registry.state(project) == ProjectState::Running
            {
                registry.set_state(project, ProjectState::Idle);
            }
        }
        exit_tx.send_replace(true);
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(Attempt::Exited(code));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.port_conflict_retries, 1);
        assert!(config.reclaim_ports);
    }

    #[tokio::test]
    async fn unknown_project_is_idle_and_stop_is_trivial() {
        let supervisor = Supervisor::new(SupervisorConfig::default(), Arc::new(|_: SupervisorEvent| {}));
        assert_eq!(supervisor.state("nothing").await, ProjectState::Idle);
        assert!(supervisor.stop("nothing").await);
        assert!(supervisor.cancel("nothing").await);
        assert!(supervisor.running().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_pattern_fails_before_spawn() {
        let supervisor = Supervisor::new(SupervisorConfig::default(), Arc::new(|_: SupervisorEvent| {}));
        let spec = LaunchSpec::new("broken", "/definitely/not/here", ".").ready_when(["(unclosed"]);
        let err = supervisor.start(spec).await.expect_err("Should fail");
        assert!(matches!(err, StartError::InvalidPattern { .. }));
        assert_eq!(supervisor.state("broken").await, ProjectState::Idle);
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let supervisor = Supervisor::new(SupervisorConfig::default(), Arc::new(|_: SupervisorEvent| {}));
        let spec = LaunchSpec::new("ghost", "/definitely/not/here", ".");
        let err = supervisor.start(spec).await.expect_err("Should fail");
        assert!(matches!(err, StartError::Spawn { .. }));
        assert_eq!(supervisor.state("ghost").await, ProjectState::Idle);
    }

    #[tokio::test]
    async fn gates_are_released_once_starts_finish() {
        let supervisor = Supervisor::new(SupervisorConfig::default(), Arc::new(|_: SupervisorEvent| {}));
        let starts = (0..8).map(|i| {
            let supervisor = supervisor.clone();
            let project = format!("ghost-{}", i % 3);
            tokio::spawn(async move {
                supervisor
                    .start(LaunchSpec::new(project, "/definitely/not/here", "."))
                    .await
            })
        });
        for result in join_all(starts).await {
            let err = result.expect("Should join").expect_err("Should fail");
            assert!(matches!(err, StartError::Spawn { .. }));
        }
        assert!(supervisor.inner.gates.lock().await.is_empty());
    }
}
