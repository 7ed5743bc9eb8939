//! Tool Registry — merges the catalogs of several tool servers into one
//! namespace and routes calls back to the owning server.
//!
//! Tools are exposed to the model as `{server}__{tool}`. Server names may not
//! contain `_`, so the first `__` in a qualified name is always the separator.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use toolweave_core::config::ServerConfig;
use toolweave_core::types::ToolDefinition;
use toolweave_mcp::{McpToolClient, ToolDescriptor, ToolOutput, ToolServer};
use tracing::{debug, info, warn};

use super::schema::validate_descriptor;

/// Separator between server and tool name in a qualified tool name.
pub const SEPARATOR: &str = "__";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid tool server name '{0}': use ASCII letters, digits or '-'")]
    InvalidServerName(String),

    #[error("tool server '{0}' is already registered")]
    DuplicateServer(String),
}

/// Whether `name` can prefix qualified tool names unambiguously.
pub fn is_valid_server_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// `{server}__{tool}`.
pub fn qualify(server: &str, tool: &str) -> String {
    format!("{server}{SEPARATOR}{tool}")
}

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores tool servers keyed by name and dispatches qualified calls.
pub struct ToolRegistry {
    servers: HashMap<String, Arc<dyn ToolServer>>,
    /// Last merged catalog, sorted by qualified name.
    catalog: RwLock<Vec<(String, ToolDescriptor)>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
            catalog: RwLock::new(Vec::new()),
        }
    }

    /// Build a registry with one subprocess client per configured server.
    pub fn from_configs(configs: &[ServerConfig]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(Arc::new(McpToolClient::new(config.clone())))?;
        }
        Ok(registry)
    }

    /// Register a server under its own name.
    pub fn register(&mut self, server: Arc<dyn ToolServer>) -> Result<(), RegistryError> {
        let name = server.name().to_string();
        if !is_valid_server_name(&name) {
            return Err(RegistryError::InvalidServerName(name));
        }
        if self.servers.contains_key(&name) {
            return Err(RegistryError::DuplicateServer(name));
        }
        info!(server = %name, "registered tool server");
        self.servers.insert(name, server);
        Ok(())
    }

    /// Names of all registered servers, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    // ────────────── Catalog ──────────────

    /// Fetch every server's catalog and merge them under qualified names.
    ///
    /// A server that fails to answer contributes nothing. Invalid
    /// descriptors are dropped with a warning.
    pub async fn list_all_tools(&self) -> Vec<(String, ToolDescriptor)> {
        let mut merged = Vec::new();
        for server_name in self.server_names() {
            let Some(server) = self.servers.get(&server_name) else {
                continue;
            };
            for descriptor in server.list_tools().await {
                let tool_name = descriptor.name.clone();
                match validate_descriptor(descriptor) {
                    Ok(valid) => merged.push((qualify(&server_name, &valid.name), valid)),
                    Err(reason) => {
                        warn!(server = %server_name, tool = %tool_name, %reason, "dropping tool descriptor");
                    }
                }
            }
        }
        merged.sort_by(|a, b| a.0.cmp(&b.0));
        merged.dedup_by(|a, b| a.0 == b.0);
        merged
    }

    /// Fetch the merged catalog, retrying while it comes back empty.
    ///
    /// An empty catalog after the last attempt is accepted and cached.
    /// Returns the number of cached tools.
    pub async fn refresh_with_retry(&self, retries: u32, delay: Duration) -> usize {
        let attempts = retries.max(1);
        let mut tools = Vec::new();
        for attempt in 1..=attempts {
            tools = self.list_all_tools().await;
            if !tools.is_empty() {
                break;
            }
            if attempt < attempts {
                warn!(attempt, attempts, "tool catalog empty, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }

        let count = tools.len();
        if count == 0 {
            warn!("no tools available after {} attempt(s)", attempts);
        } else {
            info!(tools = count, "tool catalog loaded");
        }
        self.store(tools);
        count
    }

    /// The cached catalog, fetched once more if it is empty.
    pub async fn cached_tools(&self) -> Vec<(String, ToolDescriptor)> {
        let cached = self.snapshot();
        if !cached.is_empty() || self.servers.is_empty() {
            return cached;
        }
        debug!("tool catalog empty, refreshing on demand");
        let tools = self.list_all_tools().await;
        self.store(tools.clone());
        tools
    }

    /// Model-facing definitions for the cached catalog.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.cached_tools()
            .await
            .into_iter()
            .map(|(qualified, d)| ToolDefinition::new(qualified, d.description, d.input_schema))
            .collect()
    }

    fn snapshot(&self) -> Vec<(String, ToolDescriptor)> {
        self.catalog
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store(&self, tools: Vec<(String, ToolDescriptor)>) {
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = tools;
    }

    // ────────────── Dispatch ──────────────

    /// Route a qualified call to its server.
    ///
    /// Routing failures come back as error output; this never fails.
    pub async fn invoke(
        &self,
        qualified: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> ToolOutput {
        let Some((server_name, tool_name)) = qualified.split_once(SEPARATOR) else {
            warn!(tool = qualified, "tool name without server prefix");
            return ToolOutput::error(format!("Tool name is missing a server prefix: {qualified}"));
        };

        let Some(server) = self.servers.get(server_name) else {
            warn!(server = server_name, "unknown tool server");
            return ToolOutput::error(format!("Unknown tool server: {server_name}"));
        };

        debug!(server = server_name, tool = tool_name, "invoking tool");
        server.call_tool(tool_name, arguments, timeout).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
