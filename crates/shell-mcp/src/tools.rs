//! MCP tool parameter types for the `bash` and `process` tools.
//!
//! Field names follow the wire convention agents already use for these
//! tools (camelCase), so the serde renames here are load-bearing.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `bash` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BashParams {
    /// Shell command to execute
    pub command: String,

    /// Working directory; defaults to the server's current directory
    #[serde(default)]
    pub workdir: Option<String>,

    /// Extra environment variables layered over the inherited environment
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,

    /// Milliseconds to wait in the foreground before backgrounding
    /// (clamped to 10..120000)
    #[serde(default)]
    pub yield_ms: Option<u64>,

    /// Background the command immediately without waiting
    #[serde(default)]
    pub background: bool,

    /// Hard timeout in seconds; 0 or negative disables the guard
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Stdin mode; only "pipe" is supported
    #[serde(default)]
    pub stdin_mode: Option<String>,
}

/// Parameters for the `process` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessParams {
    /// One of: list, poll, log, write, kill, clear, remove
    pub action: String,

    /// Target session; required for every action except list
    #[serde(default)]
    pub session_id: Option<String>,

    /// Data to write to stdin (write action)
    #[serde(default)]
    pub data: Option<String>,

    /// Close stdin after writing (write action)
    #[serde(default)]
    pub eof: bool,

    /// Zero-based first line of a log window (log action)
    #[serde(default)]
    pub offset: Option<u64>,

    /// Number of log lines to return; without an offset this selects the
    /// last N lines (log action)
    #[serde(default)]
    pub limit: Option<u64>,
}
