//! Shell MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router]
//! pattern. It routes the `bash` and `process` tool calls into the session
//! layer.

use std::sync::Arc;
use std::time::Duration;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};

use tracing::{debug, info, instrument, warn};

use shell_mcp_core::{Error, ServerConfig};
use shell_mcp_session::{
    parse_session_id, run_command, ProcessAction, ProcessController, ProgressFn, RunOutcome,
    RunRequest, RunnerDefaults, SessionRegistry,
};

use crate::tools::*;

/// Shell MCP Server
///
/// Runs shell commands on behalf of the client and manages the sessions
/// they leave behind.
#[derive(Clone)]
pub struct ShellMcpServer {
    /// Control plane over the shared session registry
    controller: ProcessController,
    /// Server-side defaults for the bash tool
    defaults: RunnerDefaults,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

fn to_mcp_error(err: Error) -> McpError {
    let code = match err {
        Error::EmptyCommand
        | Error::UnsupportedStdinMode(_)
        | Error::MissingSessionId
        | Error::UnknownAction(_)
        | Error::InvalidInput(_)
        | Error::SessionNotFound(_)
        | Error::NotBackgrounded(_)
        | Error::NotFinished(_)
        | Error::NotRunning(_)
        | Error::StdinClosed(_) => ErrorCode(-32602), // Invalid params
        _ => ErrorCode(-32603), // Internal error
    };
    McpError::new(code, err.to_string(), None)
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

#[tool_router]
impl ShellMcpServer {
    /// Create a server with defaults plus environment overrides.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default().with_env_overrides())
    }

    /// Create a server from explicit configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(Duration::from_millis(
            config.process.job_ttl_ms,
        )));
        Self {
            controller: ProcessController::new(registry),
            defaults: RunnerDefaults::from(&config.bash),
            tool_router: Self::tool_router(),
        }
    }

    /// The session registry backing this server.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.controller.registry()
    }

    /// Run a shell command
    #[tool(
        description = "Run a shell command. Fast commands return their output directly; \
                       commands that outlive the yield window (or pass background=true) keep \
                       running as a session managed through the process tool."
    )]
    #[instrument(skip_all)]
    async fn bash(
        &self,
        Parameters(params): Parameters<BashParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            command = %params.command,
            background = params.background,
            yield_ms = ?params.yield_ms,
            "Running command"
        );

        let request = RunRequest {
            command: params.command,
            workdir: params.workdir,
            env: params.env,
            yield_ms: params.yield_ms,
            background: params.background,
            timeout_secs: params.timeout,
            stdin_mode: params.stdin_mode,
        };

        let on_update: ProgressFn = Arc::new(|update| {
            debug!(
                session_id = %update.session_id,
                tail_chars = update.tail.chars().count(),
                "output update"
            );
        });

        match run_command(
            self.registry(),
            request,
            &self.defaults,
            Some(on_update),
            None,
        )
        .await
        {
            Ok(RunOutcome::Completed {
                exit_code,
                duration_ms,
                output,
            }) => {
                info!(exit_code, duration_ms, "Command completed");
                let text = if output.is_empty() {
                    "(no output)".to_string()
                } else {
                    output
                };
                Ok(text_result(text))
            }
            Ok(RunOutcome::Backgrounded {
                session_id,
                pid,
                started_at_ms,
                tail,
            }) => {
                info!(%session_id, pid = ?pid, started_at_ms, "Command backgrounded");
                let note = match pid {
                    Some(pid) => format!(
                        "Command still running in session {session_id} (pid {pid}, \
                         started {started_at_ms}). \
                         Use the process tool to poll, read logs, write stdin, or kill it."
                    ),
                    None => format!(
                        "Command still running in session {session_id} \
                         (started {started_at_ms}). \
                         Use the process tool to poll, read logs, write stdin, or kill it."
                    ),
                };
                let tail = tail.trim();
                let text = if tail.is_empty() {
                    note
                } else {
                    format!("{tail}\n\n{note}")
                };
                Ok(text_result(text))
            }
            Err(err) => {
                warn!(error = %err, "Command failed");
                Err(to_mcp_error(err))
            }
        }
    }

    /// Manage backgrounded command sessions
    #[tool(
        description = "Manage command sessions: list them, poll one for new output, read a \
                       window of its log, write to its stdin, kill it, or clear/remove its \
                       record."
    )]
    #[instrument(skip_all)]
    async fn process(
        &self,
        Parameters(params): Parameters<ProcessParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(action = %params.action, session_id = ?params.session_id, "Process action");

        let action: ProcessAction = params.action.parse().map_err(to_mcp_error)?;

        if action == ProcessAction::List {
            let entries = self.controller.list();
            info!(count = entries.len(), "Sessions listed");
            return Ok(text_result(ProcessController::render_list(&entries)));
        }

        let id = parse_session_id(params.session_id.as_deref()).map_err(to_mcp_error)?;

        match action {
            ProcessAction::List => unreachable!("handled above"),
            ProcessAction::Poll => {
                let outcome = self.controller.poll(id).map_err(to_mcp_error)?;
                Ok(text_result(ProcessController::render_poll(&outcome)))
            }
            ProcessAction::Log => {
                let outcome = self
                    .controller
                    .log(id, params.offset, params.limit)
                    .map_err(to_mcp_error)?;
                Ok(text_result(ProcessController::render_log(&outcome)))
            }
            ProcessAction::Write => {
                let data = match (&params.data, params.eof) {
                    (Some(data), _) => data.as_str(),
                    (None, true) => "",
                    (None, false) => {
                        return Err(to_mcp_error(Error::InvalidInput(
                            "data is required for write.".to_string(),
                        )))
                    }
                };
                let outcome = self
                    .controller
                    .write(id, data, params.eof)
                    .await
                    .map_err(to_mcp_error)?;
                Ok(text_result(ProcessController::render_write(&outcome)))
            }
            ProcessAction::Kill => {
                let text = self.controller.kill(id).map_err(to_mcp_error)?;
                Ok(text_result(text))
            }
            ProcessAction::Clear => {
                let text = self.controller.clear(id).map_err(to_mcp_error)?;
                Ok(text_result(text))
            }
            ProcessAction::Remove => {
                let text = self.controller.remove(id).map_err(to_mcp_error)?;
                Ok(text_result(text))
            }
        }
    }
}

impl Default for ShellMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

// Implement the ServerHandler trait to define server capabilities
#[tool_handler]
impl rmcp::ServerHandler for ShellMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Shell MCP Server - Run shell commands with managed lifecycles. \
                 Use bash to run a command; quick commands return their output directly \
                 while long-running ones are backgrounded into sessions. \
                 Use process to list sessions, poll for new output, read logs, write to \
                 stdin, kill a process, or drop finished records."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
