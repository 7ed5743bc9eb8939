//! One tool server, reached by spawning a fresh process per operation.
//!
//! Every `list_tools` / `call_tool` launches the configured command, performs
//! the MCP handshake (`initialize` then `notifications/initialized`), sends a
//! single request and tears the process down again. Children are spawned with
//! `kill_on_drop`, so a call abandoned on timeout or cancellation takes its
//! process with it.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use toolweave_core::config::ServerConfig;

use crate::content::format_call_result;
use crate::errors::McpError;
use crate::traits::ToolServer;
use crate::transport::StdioTransport;
use crate::types::{CallToolResult, ListToolsResult, ToolDescriptor, ToolOutput, PROTOCOL_VERSION};

/// Bound on the handshake and on `tools/list`.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a finished server gets to exit after stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Returned in place of a result when a call exceeds its timeout.
pub const TOOL_TIMEOUT_MESSAGE: &str =
    "Tool call timed out; try a different approach or a narrower query";

type ChildTransport = StdioTransport<ChildStdin, BufReader<ChildStdout>>;

/// A live, initialized server process.
struct Connection {
    child: Child,
    transport: ChildTransport,
}

impl Connection {
    /// Close stdin and give the server a moment to exit before killing it.
    async fn close(self) {
        let Connection { mut child, transport } = self;
        drop(transport);
        if tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
    }
}

/// Forward a server's stderr to the debug log until it closes.
fn drain_stderr(server: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(server = %server, "stderr: {}", line);
        }
    });
}

// ─────────────────────────────────────────────
// McpToolClient
// ─────────────────────────────────────────────

/// Client for one configured tool server.
#[derive(Clone, Debug)]
pub struct McpToolClient {
    config: ServerConfig,
}

impl McpToolClient {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn spawn(&self) -> Result<Connection, McpError> {
        let name = &self.config.name;
        let spawn_err = |reason: String| McpError::Spawn {
            server: name.clone(),
            reason,
        };

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_err(format!("{} ({})", e, self.config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err("stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err("stdout was not captured".into()))?;
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(name.clone(), stderr);
        }

        Ok(Connection {
            child,
            transport: StdioTransport::new(name, stdin, BufReader::new(stdout)),
        })
    }

    /// Spawn and complete the handshake.
    async fn open(&self) -> Result<Connection, McpError> {
        let mut conn = self.spawn()?;
        let name = self.config.name.clone();

        let handshake = async {
            conn.transport
                .request(
                    "initialize",
                    Some(json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {
                            "name": "toolweave",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    })),
                )
                .await?;
            conn.transport.notify("notifications/initialized", None).await
        };

        match tokio::time::timeout(INIT_TIMEOUT, handshake).await {
            Ok(Ok(())) => Ok(conn),
            Ok(Err(e)) => Err(McpError::Init {
                server: name,
                reason: e.to_string(),
            }),
            Err(_) => Err(McpError::Timeout {
                server: name,
                stage: "initialize",
                timeout_ms: INIT_TIMEOUT.as_millis() as u64,
            }),
        }
    }

    /// Fetch the catalog, surfacing errors.
    pub async fn try_list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let mut conn = self.open().await?;
        let value = tokio::time::timeout(INIT_TIMEOUT, conn.transport.request("tools/list", None))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.config.name.clone(),
                stage: "tools/list",
                timeout_ms: INIT_TIMEOUT.as_millis() as u64,
            })??;
        conn.close().await;

        let result: ListToolsResult =
            serde_json::from_value(value).map_err(|e| McpError::Transport {
                server: self.config.name.clone(),
                reason: format!("invalid tools/list result: {e}"),
            })?;
        Ok(result.tools)
    }

    async fn try_call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let mut conn = self.open().await?;
        let value = conn
            .transport
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        conn.close().await;

        serde_json::from_value(value).map_err(|e| McpError::Transport {
            server: self.config.name.clone(),
            reason: format!("invalid tools/call result: {e}"),
        })
    }
}

#[async_trait]
impl ToolServer for McpToolClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        match self.try_list_tools().await {
            Ok(tools) => {
                info!(server = %self.config.name, count = tools.len(), "Fetched tool catalog");
                tools
            }
            Err(e) => {
                warn!(server = %self.config.name, error = %e, "Failed to list tools");
                Vec::new()
            }
        }
    }

    /// A per-server `timeoutSecs` takes precedence over `timeout`.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> ToolOutput {
        let budget = self.config.timeout().unwrap_or(timeout);
        let started = Instant::now();

        match tokio::time::timeout(budget, self.try_call_tool(name, arguments)).await {
            Err(_) => {
                warn!(server = %self.config.name, tool = name, ?budget, "Tool call timed out");
                ToolOutput::error(TOOL_TIMEOUT_MESSAGE)
            }
            Ok(Err(e)) => {
                warn!(server = %self.config.name, tool = name, error = %e, "Tool call failed");
                ToolOutput::error(format!("Tool call failed: {e}"))
            }
            Ok(Ok(result)) => {
                let text = format_call_result(&result, self.config.result_max_chars);
                debug!(
                    server = %self.config.name,
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    is_error = result.is_error,
                    "Tool call finished"
                );
                ToolOutput {
                    text,
                    is_error: result.is_error,
                }
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;

    const INIT_REPLY: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.1"}}}"#;

    /// Write a line-oriented fake server. `call_branch` is the shell run for
    /// `tools/call` (its reply must use id 2).
    fn fake_server(dir: &Path, call_branch: &str) -> ServerConfig {
        let script = format!(
            r##"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*)
      echo '{INIT_REPLY}' ;;
    *'"method":"tools/list"'*)
      echo 'server log noise'
      echo '{{"jsonrpc":"2.0","id":2,"result":{{"tools":[{{"name":"echo","description":"Echo text","inputSchema":{{"type":"object","properties":{{"x":{{"type":"string"}}}},"required":["x"]}}}}]}}}}' ;;
    *'"method":"tools/call"'*)
      {call_branch} ;;
  esac
done
"##
        );
        let path = dir.join("server.sh");
        std::fs::write(&path, script).unwrap();
        ServerConfig::new("local", "sh", &[path.to_str().unwrap()])
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_list_tools_from_fake_server() {
        let dir = tempfile::tempdir().unwrap();
        let client = McpToolClient::new(fake_server(dir.path(), "true"));

        let tools = client.list_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].input_schema["required"][0], "x");
    }

    #[tokio::test]
    async fn test_call_tool_returns_text() {
        let dir = tempfile::tempdir().unwrap();
        let config = fake_server(
            dir.path(),
            r#"echo 'working' >&2; echo '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":" hi "}]}}'"#,
        );
        let client = McpToolClient::new(config);

        let out = client
            .call_tool("echo", args(json!({"x": "hi"})), Duration::from_secs(10))
            .await;
        assert_eq!(out, ToolOutput::ok("hi"));
    }

    #[tokio::test]
    async fn test_call_tool_is_error_result_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let config = fake_server(
            dir.path(),
            r#"echo '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"bad input"}],"isError":true}}'"#,
        );
        let out = McpToolClient::new(config)
            .call_tool("echo", Map::new(), Duration::from_secs(10))
            .await;
        assert_eq!(out, ToolOutput::error("bad input"));
    }

    #[tokio::test]
    async fn test_call_tool_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = fake_server(
            dir.path(),
            r#"echo '{"jsonrpc":"2.0","id":2,"error":{"code":-32602,"message":"Unknown tool: nope"}}'"#,
        );
        let out = McpToolClient::new(config)
            .call_tool("nope", Map::new(), Duration::from_secs(10))
            .await;
        assert!(out.is_error);
        assert_eq!(out.text, "Tool call failed: server error [-32602]: Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_call_tool_clips_to_server_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fake_server(
            dir.path(),
            r#"echo '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"abcdefghijklmnopqrstuvwxyz"}]}}'"#,
        );
        config.result_max_chars = 10;
        let out = McpToolClient::new(config)
            .call_tool("echo", Map::new(), Duration::from_secs(10))
            .await;
        assert_eq!(out.text, "abcdefghij... (truncated, original length 26)");
    }

    #[tokio::test]
    async fn test_call_tool_timeout_returns_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let config = fake_server(dir.path(), "sleep 5");
        let client = McpToolClient::new(config);

        let started = Instant::now();
        let out = client
            .call_tool("echo", Map::new(), Duration::from_millis(300))
            .await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(out, ToolOutput::error(TOOL_TIMEOUT_MESSAGE));
    }

    #[tokio::test]
    async fn test_server_timeout_overrides_caller_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fake_server(dir.path(), "sleep 5");
        config.timeout_secs = Some(0);
        let started = Instant::now();
        let out = McpToolClient::new(config)
            .call_tool("echo", Map::new(), Duration::from_secs(60))
            .await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(out.text, TOOL_TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_not_raised() {
        let config = ServerConfig::new("ghost", "/definitely/not/a/binary", &[]);
        let client = McpToolClient::new(config);

        assert!(client.list_tools().await.is_empty());

        let out = client
            .call_tool("anything", Map::new(), Duration::from_secs(5))
            .await;
        assert!(out.is_error);
        assert!(out.text.starts_with("Tool call failed: failed to spawn server 'ghost'"));
    }

    #[tokio::test]
    async fn test_server_exiting_early_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.sh");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        let client = McpToolClient::new(ServerConfig::new("dead", "sh", &[path.to_str().unwrap()]));

        let err = client.try_list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::Init { .. }));
        assert!(client.list_tools().await.is_empty());
    }
}
