//! Control plane for backgrounded sessions: list, poll, log, write, kill,
//! clear, and remove.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use shell_mcp_core::{kill_process_tree, Error, Result, SessionId, SessionStatus};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::format::{
    derive_session_name, format_duration, pad_end, slice_log_lines, truncate_middle, LogSlice,
};
use crate::registry::{epoch_ms, SessionRegistry};

/// Width of the status column in compact listings.
const STATUS_COL_WIDTH: usize = 9;
/// Characters of command text shown in a listing when no name derives.
const LIST_COMMAND_MAX: usize = 80;

/// Actions accepted by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    /// Enumerate running and recently finished sessions
    List,
    /// Drain new output from a backgrounded session
    Poll,
    /// Read a window of the full transcript
    Log,
    /// Write to a backgrounded session's stdin
    Write,
    /// Kill a backgrounded session's process tree
    Kill,
    /// Drop a finished session record
    Clear,
    /// Kill (if needed) and drop a session in either pool
    Remove,
}

impl FromStr for ProcessAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "list" => Ok(Self::List),
            "poll" => Ok(Self::Poll),
            "log" => Ok(Self::Log),
            "write" => Ok(Self::Write),
            "kill" => Ok(Self::Kill),
            "clear" => Ok(Self::Clear),
            "remove" => Ok(Self::Remove),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

/// One row of a session listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    /// Session identifier
    pub session_id: SessionId,
    /// Derived short name, when one derives
    pub name: Option<String>,
    /// Current status
    pub status: SessionStatus,
    /// OS process id, for live sessions that reported one
    pub pid: Option<u32>,
    /// Launch time, epoch milliseconds
    pub started_at_ms: u64,
    /// Exit time for finished sessions
    pub ended_at_ms: Option<u64>,
    /// Runtime so far (live) or total runtime (finished), milliseconds
    pub runtime_ms: u64,
    /// Working directory
    pub cwd: String,
    /// Original command string
    pub command: String,
    /// Recent output window
    pub tail: String,
    /// Whether aggregated output hit its cap
    pub truncated: bool,
    /// Exit code, for finished sessions
    pub exit_code: Option<i32>,
    /// Signal name, for signalled sessions
    pub exit_signal: Option<String>,
}

/// Result of polling a session for new output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    /// Session identifier
    pub session_id: SessionId,
    /// Derived short name
    pub name: Option<String>,
    /// Status at poll time
    pub status: SessionStatus,
    /// Exit code, once exited
    pub exit_code: Option<i32>,
    /// Signal name, once exited
    pub exit_signal: Option<String>,
    /// Output drained by this poll (or recorded tail for finished sessions)
    pub output: String,
}

/// Result of reading a transcript window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOutcome {
    /// Session identifier
    pub session_id: SessionId,
    /// Derived short name
    pub name: Option<String>,
    /// Status at read time
    pub status: SessionStatus,
    /// Exit code, once exited
    pub exit_code: Option<i32>,
    /// Signal name, once exited
    pub exit_signal: Option<String>,
    /// Selected transcript window
    #[serde(flatten)]
    pub slice: LogSliceView,
    /// Character count of the raw (unsliced) transcript
    pub total_chars: u64,
    /// Whether the transcript was capped
    pub truncated: bool,
}

/// Serializable view of a [`LogSlice`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSliceView {
    /// Selected lines joined with newlines
    pub text: String,
    /// Line count of the whole transcript
    pub total_lines: usize,
    /// Zero-based first line of the window
    pub start_line: usize,
    /// Zero-based line one past the window
    pub end_line: usize,
}

impl From<LogSlice> for LogSliceView {
    fn from(slice: LogSlice) -> Self {
        Self {
            text: slice.text,
            total_lines: slice.total_lines,
            start_line: slice.start,
            end_line: slice.end,
        }
    }
}

/// Result of a stdin write.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    /// Session identifier
    pub session_id: SessionId,
    /// Bytes delivered to stdin
    pub bytes_written: usize,
    /// Whether stdin was closed after the write
    pub eof: bool,
}

/// Control plane over a session registry.
///
/// Every method resolves the session id against the running and finished
/// pools and fails distinctly depending on which pool (if any) holds it.
#[derive(Debug, Clone)]
pub struct ProcessController {
    registry: Arc<SessionRegistry>,
}

impl ProcessController {
    /// Create a controller over the given registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this controller manages.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Enumerate running and finished sessions as one list, newest start
    /// first.
    pub fn list(&self) -> Vec<ListEntry> {
        let now = epoch_ms();
        let mut entries: Vec<ListEntry> = self
            .registry
            .list_running()
            .into_iter()
            .map(|snapshot| ListEntry {
                session_id: snapshot.id,
                name: derive_session_name(&snapshot.command),
                status: SessionStatus::Running,
                pid: snapshot.pid,
                started_at_ms: snapshot.started_at_ms,
                ended_at_ms: None,
                runtime_ms: now.saturating_sub(snapshot.started_at_ms),
                cwd: snapshot.cwd,
                command: snapshot.command,
                tail: snapshot.tail,
                truncated: snapshot.truncated,
                exit_code: None,
                exit_signal: None,
            })
            .collect();

        entries.extend(self.registry.list_finished().into_iter().map(|record| {
            ListEntry {
                session_id: record.id,
                name: derive_session_name(&record.command),
                status: record.status,
                pid: None,
                started_at_ms: record.started_at_ms,
                ended_at_ms: Some(record.ended_at_ms),
                runtime_ms: record.ended_at_ms.saturating_sub(record.started_at_ms),
                cwd: record.cwd,
                command: record.command,
                tail: record.tail,
                truncated: record.truncated,
                exit_code: record.exit_code,
                exit_signal: record.exit_signal,
            }
        }));
        entries.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        entries
    }

    /// Render a listing as compact text, one session per line.
    pub fn render_list(entries: &[ListEntry]) -> String {
        if entries.is_empty() {
            return "No running or recent sessions.".to_string();
        }
        entries
            .iter()
            .map(|entry| {
                let label = entry.name.clone().unwrap_or_else(|| entry.command.clone());
                // A derived name can still carry a long verb token
                let label = truncate_middle(&label, LIST_COMMAND_MAX);
                format!(
                    "{} {} {} :: {}",
                    entry.session_id.short(),
                    pad_end(entry.status.name(), STATUS_COL_WIDTH),
                    format_duration(entry.runtime_ms),
                    label
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drain new output from a backgrounded session.
    ///
    /// On a finished session this reports the recorded tail instead; output
    /// already drained from a live session is never replayed.
    pub fn poll(&self, id: SessionId) -> Result<PollOutcome> {
        if let Some(session) = self.registry.get(id) {
            if !session.backgrounded() {
                return Err(Error::NotBackgrounded(id));
            }
            let (stdout, stderr) = session.drain();
            let output = join_streams(&stdout, &stderr);
            let (exit_code, exit_signal) = session.exit_info();
            let status = if session.exited() {
                exit_status(exit_code, &exit_signal)
            } else {
                SessionStatus::Running
            };
            debug!(session_id = %id, chars = output.len(), "session polled");
            return Ok(PollOutcome {
                session_id: id,
                name: derive_session_name(session.command()),
                status,
                exit_code,
                exit_signal,
                output,
            });
        }

        if let Some(record) = self.registry.get_finished(id) {
            return Ok(PollOutcome {
                session_id: id,
                name: derive_session_name(&record.command),
                status: record.status,
                exit_code: record.exit_code,
                exit_signal: record.exit_signal,
                output: record.tail.trim().to_string(),
            });
        }

        Err(Error::SessionNotFound(id))
    }

    /// Render a poll as text: the drained output plus a status line.
    pub fn render_poll(outcome: &PollOutcome) -> String {
        let output = if outcome.output.is_empty() {
            "(no new output)".to_string()
        } else {
            outcome.output.clone()
        };
        let status_line = match outcome.status {
            SessionStatus::Running => "Process still running.".to_string(),
            _ => exit_line(outcome.exit_code, &outcome.exit_signal),
        };
        format!("{output}\n\n{status_line}")
    }

    /// Read a window of the full transcript of a session in either pool.
    pub fn log(&self, id: SessionId, offset: Option<u64>, limit: Option<u64>) -> Result<LogOutcome> {
        if let Some(session) = self.registry.get(id) {
            let aggregated = session.aggregated();
            let slice = slice_log_lines(&aggregated, offset, limit);
            return Ok(LogOutcome {
                session_id: id,
                name: derive_session_name(session.command()),
                status: SessionStatus::Running,
                exit_code: None,
                exit_signal: None,
                slice: slice.into(),
                total_chars: aggregated.chars().count() as u64,
                truncated: session.truncated(),
            });
        }

        if let Some(record) = self.registry.get_finished(id) {
            let slice = slice_log_lines(&record.aggregated, offset, limit);
            return Ok(LogOutcome {
                session_id: id,
                name: derive_session_name(&record.command),
                status: record.status,
                exit_code: record.exit_code,
                exit_signal: record.exit_signal,
                slice: slice.into(),
                total_chars: record.aggregated.chars().count() as u64,
                truncated: record.truncated,
            });
        }

        Err(Error::SessionNotFound(id))
    }

    /// Render a log window as text with a line-range footer.
    pub fn render_log(outcome: &LogOutcome) -> String {
        let body = if outcome.slice.text.is_empty() {
            "(no output)".to_string()
        } else {
            outcome.slice.text.clone()
        };
        let range = if outcome.slice.end_line > outcome.slice.start_line {
            format!(
                "lines {}-{} of {}",
                outcome.slice.start_line + 1,
                outcome.slice.end_line,
                outcome.slice.total_lines
            )
        } else {
            format!("0 lines of {}", outcome.slice.total_lines)
        };
        format!("{body}\n\n[{range}]")
    }

    /// Write data to a backgrounded session's stdin, optionally closing it.
    pub async fn write(&self, id: SessionId, data: &str, eof: bool) -> Result<WriteOutcome> {
        let session = self.registry.get(id).ok_or(Error::NotRunning(id))?;
        if !session.backgrounded() {
            return Err(Error::NotBackgrounded(id));
        }
        let mut stdin = session.take_stdin().ok_or(Error::StdinClosed(id))?;

        let bytes = data.as_bytes();
        let write_result = async {
            stdin.write_all(bytes).await?;
            stdin.flush().await
        }
        .await;
        if write_result.is_err() {
            // Broken pipe: the handle stays dropped
            return Err(Error::StdinClosed(id));
        }

        if eof {
            let _ = stdin.shutdown().await;
            debug!(session_id = %id, bytes = bytes.len(), "stdin written and closed");
        } else {
            session.restore_stdin(stdin);
            debug!(session_id = %id, bytes = bytes.len(), "stdin written");
        }

        Ok(WriteOutcome {
            session_id: id,
            bytes_written: bytes.len(),
            eof,
        })
    }

    /// Render a write as text.
    pub fn render_write(outcome: &WriteOutcome) -> String {
        if outcome.eof {
            format!(
                "Wrote {} bytes to session {} (stdin closed).",
                outcome.bytes_written, outcome.session_id
            )
        } else {
            format!(
                "Wrote {} bytes to session {}.",
                outcome.bytes_written, outcome.session_id
            )
        }
    }

    /// Kill a backgrounded session's process tree and finalize it as failed.
    pub fn kill(&self, id: SessionId) -> Result<String> {
        let session = self.registry.get(id).ok_or(Error::NotRunning(id))?;
        if !session.backgrounded() {
            return Err(Error::NotBackgrounded(id));
        }
        if let Some(pid) = session.pid() {
            kill_process_tree(pid);
        }
        self.registry.mark_exited(
            &session,
            None,
            Some("SIGKILL".to_string()),
            SessionStatus::Failed,
        );
        debug!(session_id = %id, "session killed");
        Ok(format!("Killed session {id}."))
    }

    /// Drop a finished session record.
    pub fn clear(&self, id: SessionId) -> Result<String> {
        if self.registry.get_finished(id).is_some() {
            self.registry.delete(id);
            return Ok(format!("Cleared session {id}."));
        }
        if self.registry.get(id).is_some() {
            return Err(Error::NotFinished(id));
        }
        Err(Error::SessionNotFound(id))
    }

    /// Remove a session from either pool, killing it first when live.
    pub fn remove(&self, id: SessionId) -> Result<String> {
        if let Some(session) = self.registry.get(id) {
            if let Some(pid) = session.pid() {
                kill_process_tree(pid);
            }
            self.registry.mark_exited(
                &session,
                None,
                Some("SIGKILL".to_string()),
                SessionStatus::Failed,
            );
            self.registry.delete(id);
            debug!(session_id = %id, "running session removed");
            return Ok(format!("Removed session {id}."));
        }
        if self.registry.get_finished(id).is_some() {
            self.registry.delete(id);
            return Ok(format!("Removed session {id}."));
        }
        Err(Error::SessionNotFound(id))
    }
}

/// Parse a raw session id, distinguishing absent from malformed.
pub fn parse_session_id(raw: Option<&str>) -> Result<SessionId> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let raw = raw.ok_or(Error::MissingSessionId)?;
    raw.parse::<SessionId>()
        .map_err(|_| Error::InvalidInput(format!("Invalid sessionId {raw}")))
}

fn join_streams(stdout: &str, stderr: &str) -> String {
    let mut parts = Vec::new();
    let stdout = stdout.trim_end();
    let stderr = stderr.trim_end();
    if !stdout.is_empty() {
        parts.push(stdout);
    }
    if !stderr.is_empty() {
        parts.push(stderr);
    }
    parts.join("\n").trim().to_string()
}

fn exit_status(exit_code: Option<i32>, exit_signal: &Option<String>) -> SessionStatus {
    if exit_code == Some(0) && exit_signal.is_none() {
        SessionStatus::Completed
    } else {
        SessionStatus::Failed
    }
}

fn exit_line(exit_code: Option<i32>, exit_signal: &Option<String>) -> String {
    match (exit_code, exit_signal) {
        (_, Some(signal)) => format!("Process exited with signal {signal}."),
        (Some(code), None) => format!("Process exited with code {code}."),
        (None, None) => "Process exited.".to_string(),
    }
}
