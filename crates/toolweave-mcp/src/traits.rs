use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::types::{ToolDescriptor, ToolOutput};

/// A named source of tools. The registry only talks to servers through this
/// trait, so tests can stand in for real subprocesses.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Namespace prefix for this server's tools.
    fn name(&self) -> &str;

    /// Current catalog. Failures yield an empty list.
    async fn list_tools(&self) -> Vec<ToolDescriptor>;

    /// Run one tool. Never fails: errors come back as `is_error` output.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> ToolOutput;
}
