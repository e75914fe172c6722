//! Shell primitives: interactive shell resolution, process-tree termination,
//! and binary output sanitizing.
//!
//! These are the only operating-system touch points the session layer relies
//! on; everything above them is platform independent.

use serde::{Deserialize, Serialize};

/// How to invoke the platform shell for a command string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellInvocation {
    /// Shell program (e.g. "/bin/bash", "cmd.exe")
    pub program: String,
    /// Arguments preceding the command string (e.g. ["-c"])
    pub args: Vec<String>,
}

/// Resolve the platform-appropriate shell invocation.
///
/// On Unix this honors `$SHELL`, falling back to `/bin/bash` and then
/// `/bin/sh`; the command string is passed via `-c`. On Windows `cmd.exe /C`
/// is used.
pub fn resolve_shell() -> ShellInvocation {
    #[cfg(unix)]
    {
        let program = std::env::var("SHELL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                if std::path::Path::new("/bin/bash").exists() {
                    "/bin/bash".to_string()
                } else {
                    "/bin/sh".to_string()
                }
            });
        ShellInvocation {
            program,
            args: vec!["-c".to_string()],
        }
    }

    #[cfg(windows)]
    {
        ShellInvocation {
            program: "cmd.exe".to_string(),
            args: vec!["/C".to_string()],
        }
    }
}

/// Best-effort termination of a process and all of its descendants.
///
/// Never returns an error: signalling an already-dead process is a no-op.
/// Commands are spawned in their own process group, so on Unix the whole
/// tree can be reached through the negative pid.
#[cfg(unix)]
pub fn kill_process_tree(pid: u32) {
    unsafe {
        // Signal the group first, then the leader in case it escaped the group
        libc::kill(-(pid as i32), libc::SIGKILL);
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

/// Best-effort termination of a process and all of its descendants
/// (Windows implementation).
#[cfg(windows)]
pub fn kill_process_tree(pid: u32) {
    use std::process::Command;
    let _ = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output();
}

/// Strip bytes that would corrupt text rendering from a raw output chunk.
///
/// Invalid UTF-8 sequences and control characters are removed; newlines,
/// carriage returns, and tabs are preserved so formatting survives.
pub fn sanitize_binary_output(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|&c| c == '\n' || c == '\r' || c == '\t' || (!c.is_control() && c != '\u{FFFD}'))
        .collect()
}
