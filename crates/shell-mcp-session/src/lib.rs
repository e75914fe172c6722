//! Session lifecycle management for Shell MCP Server.
//!
//! This crate owns everything between "a command string arrived" and "a
//! transcript was handed back": spawning through the platform shell,
//! pumping and capping output, the running/finished session pools, and
//! the control plane used to poll, feed, and reap backgrounded sessions.
//!
//! # Architecture
//!
//! - [`session`] - a single process session and its buffered output
//! - [`registry`] - the running and finished pools with TTL eviction
//! - [`runner`] - spawn, foreground wait, auto-background, timeout, cancel
//! - [`control`] - list/poll/log/write/kill/clear/remove over the registry
//! - [`format`] - session naming, log slicing, and listing text

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod control;
pub mod format;
pub mod registry;
pub mod runner;
pub mod session;

pub use control::{
    parse_session_id, ListEntry, LogOutcome, PollOutcome, ProcessAction, ProcessController,
    WriteOutcome,
};
pub use format::{derive_session_name, format_duration, slice_log_lines, LogSlice};
pub use registry::SessionRegistry;
pub use runner::{
    run_command, CancelHandle, ProgressFn, ProgressUpdate, RunOutcome, RunRequest, RunnerDefaults,
};
pub use session::{FinishedSession, OutputStream, Session, SessionSnapshot};
