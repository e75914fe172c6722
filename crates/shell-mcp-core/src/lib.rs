//! # shell-mcp-core
//!
//! Core types for the Shell MCP Server.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other shell-mcp crates. It provides:
//!
//! - Session identity and status types (SessionId, SessionStatus)
//! - Error types
//! - Server configuration
//! - Shell primitives (shell resolution, process-tree kill, output sanitizing)
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other shell-mcp crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all modules
pub mod config;
pub mod error;
pub mod session;
pub mod shell;

// Re-export commonly used types
pub use config::{BashSettings, ProcessSettings, ServerConfig, ServerSettings};
pub use error::{Error, Result};
pub use session::{SessionId, SessionStatus};
pub use shell::{kill_process_tree, resolve_shell, sanitize_binary_output, ShellInvocation};
