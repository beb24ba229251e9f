//! Supervised execution of external processes.
//!
//! A job moves through `Queued -> Spawned -> Running` and ends in one of
//! `Completed`, `TimedOut`, or `SpawnFailed`. While the process runs, a
//! separate task drains its stderr so the child can never block on a full
//! pipe. On timeout the process is terminated and reaped before [`run`]
//! returns; the drain task is then joined with a bounded wait and cancelled
//! if the pipe stays open past it.
//!
//! [`run`]: ProcessSupervisor::run

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vm_core::config::JobsConfig;

use crate::command::ToolCommand;
use crate::pipeline::TransformPlan;
use crate::pool::JobSlots;

/// Longest diagnostic line kept; the rest of the line is discarded.
const MAX_LINE_BYTES: usize = 4096;
const READ_CHUNK: usize = 8192;

/// Why a job did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The process could not be started (missing binary, permissions).
    SpawnFailure(String),
    /// The process exceeded its wall-clock budget and was terminated.
    Timeout,
    /// The process ran to completion but did not exit with code 0. Exits
    /// caused by a signal carry no code.
    NonZeroExit,
    /// Waiting on the process failed at the OS level.
    Wait(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::SpawnFailure(msg) => write!(f, "spawn failure: {msg}"),
            FailureReason::Timeout => write!(f, "timed out"),
            FailureReason::NonZeroExit => write!(f, "non-zero exit"),
            FailureReason::Wait(msg) => write!(f, "wait failed: {msg}"),
        }
    }
}

/// Outcome of one supervised run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub failure: Option<FailureReason>,
    /// Last lines written to the diagnostic stream.
    pub diagnostics: Vec<String>,
    /// Wall-clock time from spawn to the end of the run (zero if never spawned).
    pub elapsed: Duration,
}

impl ExecutionResult {
    fn spawn_failed(message: String) -> Self {
        Self {
            succeeded: false,
            exit_code: None,
            timed_out: false,
            failure: Some(FailureReason::SpawnFailure(message)),
            diagnostics: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    fn completed(status: ExitStatus, diagnostics: Vec<String>, elapsed: Duration) -> Self {
        let succeeded = status.success();
        Self {
            succeeded,
            exit_code: status.code(),
            timed_out: false,
            failure: (!succeeded).then_some(FailureReason::NonZeroExit),
            diagnostics,
            elapsed,
        }
    }

    fn timed_out(diagnostics: Vec<String>, elapsed: Duration) -> Self {
        Self {
            succeeded: false,
            exit_code: None,
            timed_out: true,
            failure: Some(FailureReason::Timeout),
            diagnostics,
            elapsed,
        }
    }

    fn wait_failed(message: String, diagnostics: Vec<String>, elapsed: Duration) -> Self {
        Self {
            succeeded: false,
            exit_code: None,
            timed_out: false,
            failure: Some(FailureReason::Wait(message)),
            diagnostics,
            elapsed,
        }
    }
}

/// Tunables for termination and drain joining.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Time between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    /// Bounded wait for the drain task once the process is gone.
    pub drain_grace: Duration,
    /// Number of trailing diagnostic lines kept in the result.
    pub tail_lines: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for SupervisorOptions {
    fn from(config: &JobsConfig) -> Self {
        Self {
            kill_grace: config.kill_grace(),
            drain_grace: config.drain_grace(),
            tail_lines: config.diagnostic_tail_lines,
        }
    }
}

/// Runs plans (or arbitrary commands) as child processes under a shared
/// [`JobSlots`] limit.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    program: PathBuf,
    slots: JobSlots,
    options: SupervisorOptions,
}

impl ProcessSupervisor {
    /// Create a supervisor that runs plans with `program` (normally ffmpeg).
    pub fn new(program: PathBuf, slots: JobSlots) -> Self {
        Self {
            program,
            slots,
            options: SupervisorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn slots(&self) -> &JobSlots {
        &self.slots
    }

    /// Execute a compiled plan. The plan is consumed.
    pub async fn run(&self, plan: TransformPlan, timeout: Duration) -> ExecutionResult {
        let cmd = plan.to_command(&self.program);
        self.run_command(&cmd, timeout).await
    }

    /// Execute an arbitrary command under the same slot limit, timeout, and
    /// drain handling as [`run`](Self::run).
    ///
    /// The timeout counts from process start; time spent waiting for a slot
    /// is not charged against it.
    pub async fn run_command(&self, cmd: &ToolCommand, timeout: Duration) -> ExecutionResult {
        let tool = cmd.program_name();

        let permit = match self.slots.acquire().await {
            Ok(permit) => permit,
            Err(e) => return ExecutionResult::spawn_failed(e.to_string()),
        };
        if permit.queued() > Duration::from_millis(10) {
            tracing::info!(
                tool = %tool,
                queued_ms = permit.queued().as_millis() as u64,
                "Job slot acquired after queueing"
            );
        }

        tracing::debug!("spawn: {}", cmd.command_line());
        let mut command = cmd.to_command();
        command.stdout(Stdio::null());
        command.stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(tool = %tool, "Failed to spawn: {e}");
                return ExecutionResult::spawn_failed(format!("{tool}: {e}"));
            }
        };
        let started = Instant::now();
        let pid = child.id();
        tracing::info!(tool = %tool, pid, timeout_secs = timeout.as_secs_f64(), "Process running");

        let cancel = CancellationToken::new();
        let drain = child.stderr.take().map(|stderr| {
            tokio::spawn(drain_diagnostics(
                stderr,
                cancel.clone(),
                self.options.tail_lines,
                tool.clone(),
            ))
        });

        let result = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let diagnostics = join_drain(drain, &cancel, self.options.drain_grace).await;
                let elapsed = started.elapsed();
                if status.success() {
                    tracing::info!(
                        tool = %tool,
                        pid,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Process completed"
                    );
                } else {
                    tracing::warn!(
                        tool = %tool,
                        pid,
                        status = %status,
                        tail = %diagnostics.join(" | "),
                        "Process exited with failure"
                    );
                }
                ExecutionResult::completed(status, diagnostics, elapsed)
            }
            Ok(Err(e)) => {
                tracing::error!(tool = %tool, pid, "Failed waiting for process: {e}");
                terminate(&mut child, self.options.kill_grace).await;
                let diagnostics = join_drain(drain, &cancel, self.options.drain_grace).await;
                ExecutionResult::wait_failed(e.to_string(), diagnostics, started.elapsed())
            }
            Err(_elapsed) => {
                tracing::warn!(
                    tool = %tool,
                    pid,
                    "Process timed out after {timeout:?}; terminating"
                );
                terminate(&mut child, self.options.kill_grace).await;
                let diagnostics = join_drain(drain, &cancel, self.options.drain_grace).await;
                ExecutionResult::timed_out(diagnostics, started.elapsed())
            }
        };

        drop(permit);
        result
    }
}

/// Stop the child: SIGTERM first on unix, then SIGKILL after `grace`. The
/// child is reaped before this returns unless the OS refuses both signals.
async fn terminate(child: &mut Child, grace: Duration) {
    if request_stop(child) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => tracing::warn!("Wait after SIGTERM failed: {e}"),
            Err(_) => tracing::warn!(pid = child.id(), "Process ignored SIGTERM; sending SIGKILL"),
        }
    }

    if let Err(e) = child.kill().await {
        tracing::error!("Failed to kill process: {e}");
    }
}

/// Ask the child to exit. Returns `true` if the request was delivered.
#[cfg(unix)]
fn request_stop(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(pid, "SIGTERM failed: {e}");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_stop(_child: &Child) -> bool {
    false
}

/// Wait up to `grace` for the drain task, then cancel it and wait up to
/// `grace` again before aborting it outright.
async fn join_drain(
    drain: Option<JoinHandle<Vec<String>>>,
    cancel: &CancellationToken,
    grace: Duration,
) -> Vec<String> {
    let Some(mut handle) = drain else {
        return Vec::new();
    };

    if let Ok(joined) = tokio::time::timeout(grace, &mut handle).await {
        return joined.unwrap_or_default();
    }
    // Someone else (e.g. a grandchild) still holds the pipe open.
    cancel.cancel();

    match tokio::time::timeout(grace, &mut handle).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            tracing::warn!("Diagnostic drain task did not stop; aborting it");
            handle.abort();
            Vec::new()
        }
    }
}

/// Read `stderr` to EOF (or until cancelled), logging each line and keeping
/// the last `tail_lines`. Both `\n` and `\r` end a line, since ffmpeg
/// rewrites its progress line with carriage returns.
async fn drain_diagnostics(
    mut stderr: ChildStderr,
    cancel: CancellationToken,
    tail_lines: usize,
    tool: String,
) -> Vec<String> {
    let mut tail = DiagnosticTail::new(tail_lines, tool);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut line: Vec<u8> = Vec::with_capacity(256);

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = stderr.read(&mut chunk) => read,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("Diagnostic stream read failed: {e}");
                break;
            }
        };

        for &byte in &chunk[..n] {
            if byte == b'\n' || byte == b'\r' {
                tail.push(&line);
                line.clear();
            } else if line.len() < MAX_LINE_BYTES {
                line.push(byte);
            }
        }
    }

    tail.push(&line);
    tail.into_lines()
}

struct DiagnosticTail {
    lines: VecDeque<String>,
    limit: usize,
    tool: String,
}

impl DiagnosticTail {
    fn new(limit: usize, tool: String) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit.min(64)),
            limit,
            tool,
        }
    }

    fn push(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        tracing::trace!("[{}] {text}", self.tool);
        if self.limit == 0 {
            return;
        }
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(text.to_string());
    }

    fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}
