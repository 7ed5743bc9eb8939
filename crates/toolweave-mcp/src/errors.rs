//! MCP client error types.

use thiserror::Error;

/// Errors that can occur while talking to a tool server process.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process failed to start.
    #[error("failed to spawn server '{server}': {reason}")]
    Spawn { server: String, reason: String },

    /// The initialization handshake failed.
    #[error("server '{server}' initialization failed: {reason}")]
    Init { server: String, reason: String },

    /// JSON-RPC communication error (malformed message, I/O error, closed pipe).
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    Server { code: i64, message: String },

    /// A step did not finish in time.
    #[error("server '{server}' timed out after {timeout_ms}ms during {stage}")]
    Timeout {
        server: String,
        stage: &'static str,
        timeout_ms: u64,
    },
}
