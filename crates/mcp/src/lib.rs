//! MCP server exposing sandbox tools over line-delimited JSON-RPC on stdio.
//!
//! Tools: `create_sandbox`, `run_code`, `exec_script`, `destroy_sandbox`
//! and `list_sandboxes`. A failing tool answers with `isError: true` rather
//! than a protocol error so the calling model can read the message.

pub mod server;
pub mod tools;
pub mod types;

pub use {
    server::McpServer,
    tools::{SandboxTool, ToolError, ToolOutput, ToolRegistry},
};
