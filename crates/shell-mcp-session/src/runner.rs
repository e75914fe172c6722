//! Command execution: spawn, pump output, and either finish in the
//! foreground or release the session to the background.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shell_mcp_core::config::{self, clamp_or_default};
use shell_mcp_core::{
    kill_process_tree, resolve_shell, sanitize_binary_output, BashSettings, Error, Result,
    SessionId, SessionStatus,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::format::chunk_str;
use crate::registry::{epoch_ms, SessionRegistry};
use crate::session::{FinishedSession, OutputStream, Session};

/// Largest single chunk appended to session buffers.
pub const CHUNK_LIMIT: usize = 8 * 1024;

/// Parameters for one command run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Shell command string
    pub command: String,
    /// Working directory; defaults to the server's current directory
    pub workdir: Option<String>,
    /// Extra environment variables layered over the inherited environment
    pub env: Option<HashMap<String, String>>,
    /// Foreground wait before auto-backgrounding, in milliseconds
    pub yield_ms: Option<u64>,
    /// Skip the foreground wait entirely
    pub background: bool,
    /// Hard timeout in seconds; zero or negative disables the guard
    pub timeout_secs: Option<f64>,
    /// Requested stdin mode; only "pipe" is supported
    pub stdin_mode: Option<String>,
}

/// Server-side defaults applied when a request leaves a knob unset.
#[derive(Debug, Clone)]
pub struct RunnerDefaults {
    /// Default yield window, milliseconds
    pub yield_ms: u64,
    /// Default timeout, seconds (0 disables)
    pub timeout_secs: u64,
    /// Aggregated output cap per session, characters
    pub max_output_chars: usize,
}

impl From<&BashSettings> for RunnerDefaults {
    fn from(settings: &BashSettings) -> Self {
        Self {
            yield_ms: settings.default_yield_ms,
            timeout_secs: settings.default_timeout_secs,
            max_output_chars: settings.max_output_chars,
        }
    }
}

impl Default for RunnerDefaults {
    fn default() -> Self {
        Self {
            yield_ms: config::DEFAULT_YIELD_MS,
            timeout_secs: config::DEFAULT_TIMEOUT_SECS,
            max_output_chars: config::DEFAULT_OUTPUT_CHARS,
        }
    }
}

/// Streaming notification emitted as output accumulates.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Session producing the output
    pub session_id: SessionId,
    /// Current recent-output window
    pub tail: String,
}

/// Callback invoked from the output pumps on every appended chunk.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Cooperative cancellation for an in-flight run.
///
/// Firing kills the process tree; the session is then finalized as failed
/// through the normal exit path.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    fired: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    /// Create an unfired handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.fired.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Whether the handle has fired.
    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the handle fires; resolves immediately if it already
    /// has.
    pub async fn cancelled(&self) {
        loop {
            if self.inner.fired.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.inner.fired.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// How a foreground run resolved.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The command finished within the yield window with status completed.
    Completed {
        /// Exit code (0)
        exit_code: i32,
        /// Wall-clock runtime in milliseconds
        duration_ms: u64,
        /// Trimmed aggregated output
        output: String,
    },
    /// The command outlived the yield window (or asked for background) and
    /// keeps running as a pollable session.
    Backgrounded {
        /// Session to poll for further output
        session_id: SessionId,
        /// OS process id, when known
        pid: Option<u32>,
        /// Launch time, epoch milliseconds
        started_at_ms: u64,
        /// Output captured so far
        tail: String,
    },
}

/// Run a shell command against the registry.
///
/// The command is spawned through the platform shell in its own process
/// group with piped stdio. Output is pumped into the session as sanitized
/// chunks. The call resolves when the process exits or the yield window
/// elapses, whichever comes first; with `background` set it resolves as
/// soon as the session is registered. Timeout and cancellation both kill
/// the process tree and surface through the failure path, and both stay
/// armed after the session is backgrounded.
pub async fn run_command(
    registry: &Arc<SessionRegistry>,
    request: RunRequest,
    defaults: &RunnerDefaults,
    on_update: Option<ProgressFn>,
    cancel: Option<CancelHandle>,
) -> Result<RunOutcome> {
    let command = request.command.trim().to_string();
    if command.is_empty() {
        return Err(Error::EmptyCommand);
    }
    if let Some(mode) = request.stdin_mode.as_deref() {
        if mode != "pipe" {
            return Err(Error::UnsupportedStdinMode(mode.to_string()));
        }
    }

    let yield_ms = clamp_or_default(
        request.yield_ms,
        defaults.yield_ms,
        config::MIN_YIELD_MS,
        config::MAX_YIELD_MS,
    );
    let timeout_secs = effective_timeout(request.timeout_secs, defaults.timeout_secs);

    let cwd = request
        .workdir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string())
        });

    let shell = resolve_shell();
    let mut cmd = Command::new(&shell.program);
    cmd.args(&shell.args)
        .arg(&command)
        .current_dir(&cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(env) = &request.env {
        cmd.envs(env.iter());
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| Error::SpawnFailed(e.to_string()))?;
    let pid = child.id();
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let session = Arc::new(Session::new(
        SessionId::new(),
        command,
        cwd,
        epoch_ms(),
        pid,
        defaults.max_output_chars,
        stdin,
    ));
    registry.add(Arc::clone(&session))?;
    let started = Instant::now();
    debug!(session_id = %session.id(), pid = ?pid, yield_ms, "command spawned");

    let stdout_pump = spawn_pump(stdout, Arc::clone(&session), OutputStream::Stdout, on_update.clone());
    let stderr_pump = spawn_pump(stderr, Arc::clone(&session), OutputStream::Stderr, on_update);

    let timed_out = Arc::new(AtomicBool::new(false));
    let cancelled = Arc::new(AtomicBool::new(false));
    let exit_notify = Arc::new(Notify::new());
    let (done_tx, mut done_rx) = oneshot::channel::<FinishedSession>();

    // Exit watcher: owns the child, records the outcome, and moves the
    // session to the finished pool whether or not the caller is still
    // waiting.
    {
        let registry = Arc::clone(registry);
        let session = Arc::clone(&session);
        let timed_out = Arc::clone(&timed_out);
        let cancelled = Arc::clone(&cancelled);
        let exit_notify = Arc::clone(&exit_notify);
        tokio::spawn(async move {
            let wait_result = child.wait().await;
            // Let the pumps flush, but never stall on a grandchild that
            // inherited the pipes
            let flush = async {
                let _ = stdout_pump.await;
                let _ = stderr_pump.await;
            };
            let _ = tokio::time::timeout(Duration::from_secs(2), flush).await;

            let (exit_code, exit_signal) = match wait_result {
                Ok(status) => (status.code(), signal_name(&status)),
                Err(err) => {
                    warn!(session_id = %session.id(), error = %err, "wait failed");
                    (None, None)
                }
            };
            let success = exit_code == Some(0)
                && exit_signal.is_none()
                && !timed_out.load(Ordering::SeqCst)
                && !cancelled.load(Ordering::SeqCst);
            let status = if success {
                SessionStatus::Completed
            } else {
                SessionStatus::Failed
            };
            if let Some(record) = registry.mark_exited(&session, exit_code, exit_signal, status) {
                let _ = done_tx.send(record);
            }
            exit_notify.notify_one();
        });
    }

    // Timeout and cancellation guard; disarmed by process exit. Stays
    // alive after the session is backgrounded.
    if timeout_secs.is_some() || cancel.is_some() {
        let timed_out = Arc::clone(&timed_out);
        let cancelled = Arc::clone(&cancelled);
        let exit_notify = Arc::clone(&exit_notify);
        let session = Arc::clone(&session);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let timeout_wait = async {
                match timeout_secs {
                    Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs)).await,
                    None => std::future::pending().await,
                }
            };
            let cancel_wait = async {
                match &cancel {
                    Some(handle) => handle.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = exit_notify.notified() => {}
                _ = timeout_wait => {
                    timed_out.store(true, Ordering::SeqCst);
                    debug!(session_id = %session.id(), "command timed out");
                    if let Some(pid) = session.pid() {
                        kill_process_tree(pid);
                    }
                }
                _ = cancel_wait => {
                    cancelled.store(true, Ordering::SeqCst);
                    debug!(session_id = %session.id(), "command cancelled");
                    if let Some(pid) = session.pid() {
                        kill_process_tree(pid);
                    }
                }
            }
        });
    }

    if request.background {
        session.mark_backgrounded();
        return Ok(RunOutcome::Backgrounded {
            session_id: session.id(),
            pid,
            started_at_ms: session.started_at_ms(),
            tail: session.tail(),
        });
    }

    tokio::select! {
        record = &mut done_rx => {
            match record {
                Ok(record) => finish(record, &timed_out, timeout_secs, started),
                Err(_) => Err(Error::ExecutionFailed(
                    "Command aborted before exit code was captured".to_string(),
                )),
            }
        }
        _ = tokio::time::sleep(Duration::from_millis(yield_ms)) => {
            session.mark_backgrounded();
            debug!(session_id = %session.id(), "command backgrounded");
            Ok(RunOutcome::Backgrounded {
                session_id: session.id(),
                pid,
                started_at_ms: session.started_at_ms(),
                tail: session.tail(),
            })
        }
    }
}

fn finish(
    record: FinishedSession,
    timed_out: &AtomicBool,
    timeout_secs: Option<f64>,
    started: Instant,
) -> Result<RunOutcome> {
    let output = record.aggregated.trim().to_string();
    if record.status == SessionStatus::Completed {
        return Ok(RunOutcome::Completed {
            exit_code: record.exit_code.unwrap_or(0),
            duration_ms: started.elapsed().as_millis() as u64,
            output,
        });
    }

    let reason = if timed_out.load(Ordering::SeqCst) {
        let secs = timeout_secs.unwrap_or(0.0);
        format!("Command timed out after {} seconds", format_secs(secs))
    } else if let Some(signal) = &record.exit_signal {
        format!("Command aborted by signal {signal}")
    } else if let Some(code) = record.exit_code {
        format!("Command exited with code {code}")
    } else {
        "Command aborted before exit code was captured".to_string()
    };

    let message = if output.is_empty() {
        reason
    } else {
        format!("{output}\n\n{reason}")
    };
    Err(Error::ExecutionFailed(message))
}

fn effective_timeout(requested: Option<f64>, default_secs: u64) -> Option<f64> {
    match requested {
        Some(secs) if secs > 0.0 => Some(secs),
        Some(_) => None,
        None if default_secs > 0 => Some(default_secs as f64),
        None => None,
    }
}

fn format_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as i64)
    } else {
        format!("{secs}")
    }
}

fn spawn_pump<R>(
    stream: Option<R>,
    session: Arc<Session>,
    which: OutputStream,
    on_update: Option<ProgressFn>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut stream) = stream else { return };
        let mut buf = [0u8; CHUNK_LIMIT];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = sanitize_binary_output(&buf[..n]);
                    for chunk in chunk_str(&text, CHUNK_LIMIT) {
                        session.append_output(which, chunk);
                    }
                    if let Some(callback) = &on_update {
                        callback(ProgressUpdate {
                            session_id: session.id(),
                            tail: session.tail(),
                        });
                    }
                }
            }
        }
    })
}

#[cfg(unix)]
fn signal_name(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|sig| {
        match sig {
            1 => "SIGHUP".to_string(),
            2 => "SIGINT".to_string(),
            3 => "SIGQUIT".to_string(),
            6 => "SIGABRT".to_string(),
            9 => "SIGKILL".to_string(),
            11 => "SIGSEGV".to_string(),
            13 => "SIGPIPE".to_string(),
            15 => "SIGTERM".to_string(),
            other => format!("signal {other}"),
        }
    })
}

#[cfg(not(unix))]
fn signal_name(_status: &std::process::ExitStatus) -> Option<String> {
    None
}
