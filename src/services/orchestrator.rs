use crate::metrics::Metrics;
use crate::models::{ErrorKind, ProcessingRequest, ProcessingResult};
use crate::services::artifacts::ArtifactPaths;
use crate::services::command::build_args;
use crate::services::executable::{ExecutableLocator, ResolveError};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Bytes requested from a child pipe per read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long to wait for the output pipes to reach EOF after the child is gone.
const STREAM_DRAIN_GRACE: Duration = Duration::from_secs(5);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Failures that stop a run before the tool is running.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Input file not found: {path}")]
    InputNotFound { path: Utf8PathBuf },

    #[error(transparent)]
    Executable(#[from] ResolveError),

    #[error("Failed to start {program}: {source}")]
    Launch {
        program: Utf8PathBuf,
        source: std::io::Error,
    },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::InputNotFound { .. } => ErrorKind::InputNotFound,
            OrchestratorError::Executable(_) => ErrorKind::ExecutableNotFound,
            OrchestratorError::Launch { .. } => ErrorKind::LaunchFailed,
        }
    }
}

impl From<OrchestratorError> for ProcessingResult {
    fn from(e: OrchestratorError) -> Self {
        ProcessingResult::failed(e.kind(), e.to_string())
    }
}

/// Event relayed to observers of a run.
///
/// `Completed` is always the last event a run sends.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A chunk of the tool's standard output, verbatim
    Progress(String),
    /// A chunk of the tool's standard error, verbatim
    Error(String),
    /// The terminal outcome
    Completed(ProcessingResult),
}

/// Lifecycle of one run, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Validating,
    Launching,
    Running,
    Finalizing,
    Succeeded,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Validating => "validating",
            RunPhase::Launching => "launching",
            RunPhase::Running => "running",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Succeeded => "succeeded",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Cancellation and timeout for one run.
///
/// Both are optional. With neither set, a run lasts as long as the tool does.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the tool once the watched flag becomes `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Kill the tool after `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Handle to an in-flight run.
///
/// The handle's own receiver exists before the run starts, so [`recv`](Self::recv)
/// sees every event. Receivers from [`subscribe`](Self::subscribe) only see
/// events sent after they were created.
pub struct RunHandle {
    run_id: u64,
    events: broadcast::Receiver<RunEvent>,
    task: JoinHandle<ProcessingResult>,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Attach another observer. Already-sent chunks are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.resubscribe()
    }

    /// Next event for this handle, or `None` once the run has finished and
    /// every event was consumed.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Run {} observer lagged - {} events were skipped",
                        self.run_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the terminal result.
    pub async fn wait(self) -> ProcessingResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Run {} task failed: {}", self.run_id, e);
                ProcessingResult::failed(ErrorKind::ProcessError, format!("Run task failed: {}", e))
            }
        }
    }
}

/// Launches the external tool and relays its output.
///
/// Cloning is cheap; clones share the run counter and metrics. Each run gets
/// its own child process, buffers and event channel, so concurrent runs do
/// not see each other's output.
#[derive(Debug, Clone)]
pub struct ProcessOrchestrator {
    locator: ExecutableLocator,
    event_buffer: usize,
    metrics: Arc<Metrics>,
    next_run_id: Arc<AtomicU64>,
}

impl ProcessOrchestrator {
    pub fn new(locator: ExecutableLocator, metrics: Arc<Metrics>) -> Self {
        Self {
            locator,
            event_buffer: 1024,
            metrics,
            next_run_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Set the capacity of each run's event channel.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Start a run and return immediately.
    ///
    /// Must be called from within a tokio runtime. The run resolves exactly
    /// once, to success or a single [`ErrorKind`].
    pub fn submit(&self, request: ProcessingRequest, control: RunControl) -> RunHandle {
        self.submit_as(self.reserve_run_id(), request, control)
    }

    /// Allocate the id of a run that will be started with
    /// [`submit_as`](Self::submit_as).
    pub fn reserve_run_id(&self) -> u64 {
        self.next_run_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Like [`submit`](Self::submit), under an id from
    /// [`reserve_run_id`](Self::reserve_run_id).
    pub fn submit_as(
        &self,
        run_id: u64,
        request: ProcessingRequest,
        control: RunControl,
    ) -> RunHandle {
        let (events_tx, events_rx) = broadcast::channel(self.event_buffer);

        let run = ProcessingRun {
            run_id,
            locator: self.locator.clone(),
            metrics: Arc::clone(&self.metrics),
            events: events_tx,
        };

        let span = tracing::info_span!("run", id = run_id);
        let task = tokio::spawn(run.execute(request, control).instrument(span));

        RunHandle {
            run_id,
            events: events_rx,
            task,
        }
    }

    /// Start a run and wait for its result.
    pub async fn run(&self, request: ProcessingRequest, control: RunControl) -> ProcessingResult {
        self.submit(request, control).wait().await
    }
}

/// How the child stopped
enum Termination {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
    Cancelled,
    TimedOut(Duration),
}

/// One execution of the external tool, owned by its task.
struct ProcessingRun {
    run_id: u64,
    locator: ExecutableLocator,
    metrics: Arc<Metrics>,
    events: broadcast::Sender<RunEvent>,
}

impl ProcessingRun {
    async fn execute(self, request: ProcessingRequest, control: RunControl) -> ProcessingResult {
        self.metrics.record_run_started();
        let started = Instant::now();

        let result = self
            .drive(request, control, started)
            .await
            .with_duration(started.elapsed());

        let phase = if result.success {
            RunPhase::Succeeded
        } else {
            RunPhase::Failed
        };
        self.enter(phase);

        match result.error_kind {
            None => tracing::info!(
                "Run {} succeeded in {:.2}s",
                self.run_id,
                result.duration.as_secs_f32()
            ),
            Some(kind) => tracing::warn!(
                "Run {} failed ({}): {}",
                self.run_id,
                kind,
                result.error_message.as_deref().unwrap_or("see stderr")
            ),
        }

        self.metrics.record_run_finished(&result);

        // Ignore send errors - it's OK if no one is listening
        let _ = self.events.send(RunEvent::Completed(result.clone()));
        result
    }

    async fn drive(
        &self,
        request: ProcessingRequest,
        control: RunControl,
        started: Instant,
    ) -> ProcessingResult {
        self.enter(RunPhase::Idle);

        // Validating
        self.enter(RunPhase::Validating);
        let input = absolute_path(&request.input_path);
        if !input.exists() {
            return OrchestratorError::InputNotFound { path: input }.into();
        }

        // Launching
        self.enter(RunPhase::Launching);
        let executable = match self.locator.locate() {
            Ok(path) => path,
            Err(e) => return OrchestratorError::from(e).into(),
        };

        let args = build_args(&input, &request.options);
        let working_dir = input
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        tracing::info!("Executing: {} {}", executable, args.join(" "));

        let mut command = Command::new(executable.as_std_path());
        command
            .args(&args)
            .current_dir(working_dir.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                return OrchestratorError::Launch {
                    program: executable,
                    source,
                }
                .into();
            }
        };

        // Running
        self.enter(RunPhase::Running);
        let stdout_relay = child
            .stdout
            .take()
            .map(|pipe| self.spawn_relay(pipe, StreamKind::Stdout));
        let stderr_relay = child
            .stderr
            .take()
            .map(|pipe| self.spawn_relay(pipe, StreamKind::Stderr));

        let termination = wait_for_exit(&mut child, control).await;

        if matches!(termination, Termination::Cancelled | Termination::TimedOut(_)) {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill external tool: {}", e);
            }
        }

        // Finalizing
        self.enter(RunPhase::Finalizing);
        let drain_deadline = tokio::time::Instant::now() + STREAM_DRAIN_GRACE;
        let (stdout, stderr) = tokio::join!(
            drain(stdout_relay, drain_deadline),
            drain(stderr_relay, drain_deadline),
        );
        let elapsed = started.elapsed();

        match termination {
            Termination::Exited(status) => match status.code() {
                Some(0) => {
                    let output_files = ArtifactPaths::for_input(&input).existing();
                    if output_files.is_empty() {
                        tracing::warn!("Tool exited cleanly but wrote no artifacts for {}", input);
                    }
                    ProcessingResult::succeeded(stdout, stderr, output_files, elapsed)
                }
                Some(code) => ProcessingResult {
                    success: false,
                    exit_code: Some(code),
                    stdout,
                    stderr,
                    output_files: Default::default(),
                    error_kind: Some(ErrorKind::NonZeroExit),
                    error_message: None,
                    duration: elapsed,
                },
                None => ProcessingResult::failed(
                    ErrorKind::ProcessError,
                    format!("External tool terminated abnormally ({})", status),
                )
                .with_output(stdout, stderr),
            },
            Termination::WaitFailed(e) => ProcessingResult::failed(
                ErrorKind::ProcessError,
                format!("Failed to wait for external tool: {}", e),
            )
            .with_output(stdout, stderr),
            Termination::Cancelled => {
                ProcessingResult::failed(ErrorKind::Cancelled, "Run cancelled by user")
                    .with_output(stdout, stderr)
            }
            Termination::TimedOut(limit) => ProcessingResult::failed(
                ErrorKind::TimedOut,
                format!("Run exceeded the timeout of {:?}", limit),
            )
            .with_output(stdout, stderr),
        }
    }

    fn enter(&self, phase: RunPhase) {
        tracing::debug!("Run {} -> {}", self.run_id, phase);
    }

    fn spawn_relay<R>(&self, pipe: R, kind: StreamKind) -> Relay
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(relay_stream(
            pipe,
            kind,
            Arc::clone(&captured),
            self.events.clone(),
            Arc::clone(&self.metrics),
        ));
        Relay { task, captured }
    }
}

/// Race the child's exit against cancellation and the timeout.
async fn wait_for_exit(child: &mut Child, control: RunControl) -> Termination {
    let RunControl { cancel, timeout } = control;

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Termination::Exited(status),
            Err(e) => Termination::WaitFailed(e),
        },
        _ = cancellation(cancel) => {
            tracing::warn!("Cancellation requested - killing external tool");
            Termination::Cancelled
        }
        limit = deadline(timeout) => {
            tracing::warn!("External tool timed out after {:?}", limit);
            Termination::TimedOut(limit)
        }
    }
}

/// Resolves once the flag is `true`; never resolves without a receiver or
/// after the sender is dropped.
async fn cancellation(cancel: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel {
        if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn deadline(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

/// A running pipe reader and the bytes it has read so far.
struct Relay {
    task: JoinHandle<()>,
    captured: Arc<Mutex<Vec<u8>>>,
}

/// Wait for a relay to reach EOF, then return its output as text.
///
/// Past `deadline` the relay is aborted and whatever it read is kept.
async fn drain(relay: Option<Relay>, deadline: tokio::time::Instant) -> String {
    let Some(Relay { mut task, captured }) = relay else {
        return String::new();
    };

    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Output relay task failed: {}", e),
        Err(_) => {
            // A grandchild may still hold the pipe open
            tracing::warn!(
                "Output pipe still open {:?} after exit - keeping what was read",
                STREAM_DRAIN_GRACE
            );
            task.abort();
            // Nothing may be relayed after the terminal event
            let _ = task.await;
        }
    }

    let bytes = captured.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn event(self, text: String) -> RunEvent {
        match self {
            StreamKind::Stdout => RunEvent::Progress(text),
            StreamKind::Stderr => RunEvent::Error(text),
        }
    }
}

/// Read a pipe until EOF, relaying each chunk as it arrives.
///
/// Every byte read is appended to `captured`, in order, before it is relayed.
async fn relay_stream<R>(
    mut pipe: R,
    kind: StreamKind,
    captured: Arc<Mutex<Vec<u8>>>,
    events: broadcast::Sender<RunEvent>,
    metrics: Arc<Metrics>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8ChunkDecoder::default();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) => {
                tracing::warn!("Failed to read {:?} of external tool: {}", kind, e);
                break;
            }
        };

        let chunk = &buf[..read];
        captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
        metrics.record_bytes_relayed(read);

        let text = decoder.decode(chunk);
        if !text.is_empty() {
            let _ = events.send(kind.event(text));
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = events.send(kind.event(tail));
    }
}

/// Incremental lossy UTF-8 decoder.
///
/// A multi-byte sequence split across two reads is held back until its last
/// byte arrives. Invalid bytes become U+FFFD, matching
/// [`String::from_utf8_lossy`] on the whole stream.
#[derive(Debug, Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));

                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

fn absolute_path(path: &Utf8Path) -> Utf8PathBuf {
    std::path::absolute(path)
        .ok()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .unwrap_or_else(|| path.to_path_buf())
}
