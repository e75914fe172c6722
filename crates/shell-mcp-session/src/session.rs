//! A single shell process session and its mutable output state.

use std::sync::Mutex;

use shell_mcp_core::{SessionId, SessionStatus};
use tokio::process::ChildStdin;

/// Characters of most-recent output retained for previews and listings.
pub const TAIL_MAX_CHARS: usize = 4096;

/// Which output stream a chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Mutable per-session state, guarded by the session mutex.
#[derive(Debug, Default)]
struct SessionState {
    pending_stdout: String,
    pending_stderr: String,
    aggregated: String,
    tail: String,
    total_output_chars: u64,
    truncated: bool,
    exited: bool,
    exit_code: Option<i32>,
    exit_signal: Option<String>,
    backgrounded: bool,
    stdin: Option<ChildStdin>,
}

/// A live shell process session.
///
/// Identity and launch parameters are immutable; everything that changes
/// over the process lifetime lives behind a single mutex so readers and
/// the output pump never observe a half-applied update.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    command: String,
    cwd: String,
    started_at_ms: u64,
    pid: Option<u32>,
    max_output_chars: usize,
    state: Mutex<SessionState>,
}

/// Point-in-time view of a live session, for listings.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session identifier
    pub id: SessionId,
    /// Original command string
    pub command: String,
    /// Working directory the command runs in
    pub cwd: String,
    /// Launch time, epoch milliseconds
    pub started_at_ms: u64,
    /// OS process id, when the spawn reported one
    pub pid: Option<u32>,
    /// Recent output window
    pub tail: String,
    /// Whether aggregated output hit its cap
    pub truncated: bool,
    /// Total characters produced so far
    pub total_output_chars: u64,
    /// Whether the session has been released to the background
    pub backgrounded: bool,
}

/// Immutable record of a session after its process exited.
#[derive(Debug, Clone)]
pub struct FinishedSession {
    /// Session identifier
    pub id: SessionId,
    /// Original command string
    pub command: String,
    /// Working directory the command ran in
    pub cwd: String,
    /// Launch time, epoch milliseconds
    pub started_at_ms: u64,
    /// Exit time, epoch milliseconds
    pub ended_at_ms: u64,
    /// Terminal status (completed or failed)
    pub status: SessionStatus,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Signal name, if the process was signalled
    pub exit_signal: Option<String>,
    /// Full capped output transcript
    pub aggregated: String,
    /// Recent output window
    pub tail: String,
    /// Whether aggregated output hit its cap
    pub truncated: bool,
    /// Total characters produced over the session lifetime
    pub total_output_chars: u64,
}

impl Session {
    /// Create a session for a freshly spawned process.
    pub fn new(
        id: SessionId,
        command: String,
        cwd: String,
        started_at_ms: u64,
        pid: Option<u32>,
        max_output_chars: usize,
        stdin: Option<ChildStdin>,
    ) -> Self {
        Self {
            id,
            command,
            cwd,
            started_at_ms,
            pid,
            max_output_chars,
            state: Mutex::new(SessionState {
                stdin,
                ..SessionState::default()
            }),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Original command string.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Working directory the command runs in.
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Launch time, epoch milliseconds.
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// OS process id, when the spawn reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Append an output chunk to the pending, aggregated, and tail buffers.
    ///
    /// The chunk must already be sanitized. Aggregated output stops growing
    /// once `max_output_chars` is reached and the truncated flag is set;
    /// the tail keeps only the most recent [`TAIL_MAX_CHARS`] characters.
    pub fn append_output(&self, stream: OutputStream, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut state = self.lock_state();
        state.total_output_chars += chunk.chars().count() as u64;

        let pending = match stream {
            OutputStream::Stdout => &mut state.pending_stdout,
            OutputStream::Stderr => &mut state.pending_stderr,
        };
        pending.push_str(chunk);
        if pending.chars().count() > self.max_output_chars {
            let drop = pending.chars().count() - self.max_output_chars;
            let cut: usize = pending.chars().take(drop).map(char::len_utf8).sum();
            pending.drain(..cut);
        }

        let aggregated_len = state.aggregated.chars().count();
        if aggregated_len < self.max_output_chars {
            let room = self.max_output_chars - aggregated_len;
            let chunk_len = chunk.chars().count();
            if chunk_len <= room {
                state.aggregated.push_str(chunk);
            } else {
                let keep: usize = chunk.chars().take(room).map(char::len_utf8).sum();
                state.aggregated.push_str(&chunk[..keep]);
                state.truncated = true;
            }
        } else {
            state.truncated = true;
        }

        state.tail.push_str(chunk);
        let tail_len = state.tail.chars().count();
        if tail_len > TAIL_MAX_CHARS {
            let drop = tail_len - TAIL_MAX_CHARS;
            let cut: usize = state.tail.chars().take(drop).map(char::len_utf8).sum();
            state.tail.drain(..cut);
        }
    }

    /// Take and clear the pending stdout and stderr buffers.
    pub fn drain(&self) -> (String, String) {
        let mut state = self.lock_state();
        (
            std::mem::take(&mut state.pending_stdout),
            std::mem::take(&mut state.pending_stderr),
        )
    }

    /// Mark the session as released to the background. Idempotent.
    pub fn mark_backgrounded(&self) {
        self.lock_state().backgrounded = true;
    }

    /// Whether the session has been released to the background.
    pub fn backgrounded(&self) -> bool {
        self.lock_state().backgrounded
    }

    /// Whether the underlying process has exited.
    pub fn exited(&self) -> bool {
        self.lock_state().exited
    }

    /// Record process exit. Returns false if an exit was already recorded;
    /// the first caller wins and later calls change nothing.
    pub fn record_exit(&self, exit_code: Option<i32>, exit_signal: Option<String>) -> bool {
        let mut state = self.lock_state();
        if state.exited {
            return false;
        }
        state.exited = true;
        state.exit_code = exit_code;
        state.exit_signal = exit_signal;
        // A dead process cannot consume input
        state.stdin = None;
        true
    }

    /// Exit code and signal, once recorded.
    pub fn exit_info(&self) -> (Option<i32>, Option<String>) {
        let state = self.lock_state();
        (state.exit_code, state.exit_signal.clone())
    }

    /// Recent output window.
    pub fn tail(&self) -> String {
        self.lock_state().tail.clone()
    }

    /// Full capped output transcript.
    pub fn aggregated(&self) -> String {
        self.lock_state().aggregated.clone()
    }

    /// Whether aggregated output hit its cap.
    pub fn truncated(&self) -> bool {
        self.lock_state().truncated
    }

    /// Total characters produced so far.
    pub fn total_output_chars(&self) -> u64 {
        self.lock_state().total_output_chars
    }

    /// Take exclusive ownership of the stdin handle for a write.
    ///
    /// Returns `None` when stdin was closed, never piped, or is currently
    /// held by another writer. Pair with [`Session::restore_stdin`].
    pub fn take_stdin(&self) -> Option<ChildStdin> {
        self.lock_state().stdin.take()
    }

    /// Return the stdin handle after a write that did not close it.
    pub fn restore_stdin(&self, stdin: ChildStdin) {
        let mut state = self.lock_state();
        // If the process exited mid-write the handle stays dropped
        if !state.exited {
            state.stdin = Some(stdin);
        }
    }

    /// Point-in-time view for listings.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        SessionSnapshot {
            id: self.id,
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            started_at_ms: self.started_at_ms,
            pid: self.pid,
            tail: state.tail.clone(),
            truncated: state.truncated,
            total_output_chars: state.total_output_chars,
            backgrounded: state.backgrounded,
        }
    }

    /// Freeze the session into its finished record.
    pub fn into_finished(&self, status: SessionStatus, ended_at_ms: u64) -> FinishedSession {
        let state = self.lock_state();
        FinishedSession {
            id: self.id,
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            started_at_ms: self.started_at_ms,
            ended_at_ms,
            status,
            exit_code: state.exit_code,
            exit_signal: state.exit_signal.clone(),
            aggregated: state.aggregated.clone(),
            tail: state.tail.clone(),
            truncated: state.truncated,
            total_output_chars: state.total_output_chars,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
