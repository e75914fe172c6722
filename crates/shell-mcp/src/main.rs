//! # Shell MCP Server
//!
//! Model Context Protocol server that runs shell commands with managed
//! lifecycles.
//!
//! ## Overview
//!
//! This server provides two MCP tools:
//! - `bash`: run a command, returning output directly or backgrounding it
//!   into a session when it outlives the yield window
//! - `process`: list, poll, log, write to, kill, clear, and remove those
//!   sessions
//!
//! ## Architecture
//!
//! This is the top layer binary that ties together:
//! - shell-mcp-core: identifiers, errors, config, shell primitives
//! - shell-mcp-session: session registry, runner, and control plane

use rmcp::{transport::stdio, ServiceExt};
use shell_mcp::ShellMcpServer;
use shell_mcp_core::ServerConfig;

fn load_config() -> anyhow::Result<ServerConfig> {
    let mut args = std::env::args().skip(1);
    let mut config = ServerConfig::default();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
            config = ServerConfig::from_file(&path)?;
        }
    }
    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Initialize logging; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.server.log_level.clone())
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        yield_ms = config.bash.default_yield_ms,
        timeout_secs = config.bash.default_timeout_secs,
        max_output_chars = config.bash.max_output_chars,
        job_ttl_ms = config.process.job_ttl_ms,
        "Shell MCP Server starting..."
    );

    let server = ShellMcpServer::with_config(config);

    tracing::info!("Server initialized, starting stdio transport...");

    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("Shell MCP Server running on stdio");

    // Wait for the service to complete
    service.waiting().await?;

    tracing::info!("Shell MCP Server shutting down");

    Ok(())
}
