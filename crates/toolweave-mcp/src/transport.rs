//! JSON-RPC over stdio transport.
//!
//! One JSON object per line in each direction. Request ids are allocated per
//! connection, starting at 1.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::errors::McpError;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Bi-directional JSON-RPC transport over a child process's stdin/stdout.
pub struct StdioTransport<W, R> {
    server: String,
    writer: W,
    reader: R,
    next_id: u64,
}

impl<W, R> StdioTransport<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    pub fn new(server: &str, writer: W, reader: R) -> Self {
        Self {
            server: server.to_string(),
            writer,
            reader,
            next_id: 1,
        }
    }

    fn transport_err(&self, reason: String) -> McpError {
        McpError::Transport {
            server: self.server.clone(),
            reason,
        }
    }

    async fn send_line<T: Serialize>(&mut self, message: &T) -> Result<(), McpError> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| self.transport_err(format!("failed to serialize message: {e}")))?;
        trace!(server = %self.server, "→ {}", json);
        json.push('\n');

        self.writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_err(format!("failed to write to stdin: {e}")))?;
        self.writer
            .flush()
            .await
            .map_err(|e| self.transport_err(format!("failed to flush stdin: {e}")))
    }

    /// Send a request and read lines until the response with the same id.
    ///
    /// Blank lines, non-JSON output and messages for other ids are skipped.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send_line(&JsonRpcRequest::new(id, method, params)).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| self.transport_err(format!("failed to read from stdout: {e}")))?;

            if read == 0 {
                return Err(self.transport_err(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            trace!(server = %self.server, "← {}", trimmed);

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.answers(id) => return extract_result(resp),
                _ => continue,
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.send_line(&JsonRpcNotification::new(method, params)).await
    }
}

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::Server {
            code: err.code,
            message: err.message,
        });
    }

    response.result.ok_or(McpError::Server {
        code: -32603,
        message: "response missing both result and error".into(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
