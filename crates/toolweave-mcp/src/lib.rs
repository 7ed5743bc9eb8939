//! Model Context Protocol client for Toolweave.
//!
//! Tool servers are child processes speaking JSON-RPC 2.0 over stdio.
//!
//! - [`client::McpToolClient`] — spawns a server per operation, lists and calls tools
//! - [`transport::StdioTransport`] — line-delimited JSON-RPC framing
//! - [`content`] — flattens call results into bounded text
//! - [`traits::ToolServer`] — the seam the agent's registry is built on

pub mod client;
pub mod content;
pub mod errors;
pub mod traits;
pub mod transport;
pub mod types;

pub use client::{McpToolClient, INIT_TIMEOUT, TOOL_TIMEOUT_MESSAGE};
pub use errors::McpError;
pub use traits::ToolServer;
pub use types::{ToolDescriptor, ToolOutput};
