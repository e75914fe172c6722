//! MCP protocol layer.

pub mod server;

pub use server::ShellMcpServer;
