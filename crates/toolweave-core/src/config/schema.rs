//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig`, `ProvidersConfig`, `Vec<ServerConfig>`,
//! `CatalogConfig`, `SessionsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::DEFAULT_MAX_RECENT;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded from `~/.toolweave/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub providers: ProvidersConfig,
    /// Tool servers, in registration order.
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    pub catalog: CatalogConfig,
    pub sessions: SessionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            providers: ProvidersConfig::default(),
            servers: default_servers(),
            catalog: CatalogConfig::default(),
            sessions: SessionsConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// How a plain-text model reply is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinalAnswerPolicy {
    /// Text is final only when it carries a `<final_answer>` or `<final>` tag.
    #[default]
    Marker,
    /// Any non-empty text is final.
    AnyText,
}

/// Conversation loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// LLM model identifier.
    pub model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Model calls allowed per turn before giving up.
    pub max_rounds: usize,
    /// Distinct tool calls executed per model reply; extras are dropped.
    pub max_tool_calls_per_round: usize,
    /// Wall-clock budget for a single tool call.
    pub tool_call_timeout_secs: u64,
    pub final_answer: FinalAnswerPolicy,
    /// Replaces the built-in system prompt when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            max_rounds: 10,
            max_tool_calls_per_round: 3,
            tool_call_timeout_secs: 20,
            final_answer: FinalAnswerPolicy::Marker,
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_secs)
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single LLM provider (API key, base URL, headers).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// All provider configurations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openrouter: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub openai: ProviderConfig,
    pub moonshot: ProviderConfig,
    pub dashscope: ProviderConfig,
    pub vllm: ProviderConfig,
}

impl ProvidersConfig {
    /// Provider names, in the order they appear in the config file.
    pub const NAMES: &'static [&'static str] = &[
        "openrouter",
        "deepseek",
        "openai",
        "moonshot",
        "dashscope",
        "vllm",
    ];

    /// Get a provider config by name (e.g. `"deepseek"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openrouter" => Some(&self.openrouter),
            "deepseek" => Some(&self.deepseek),
            "openai" => Some(&self.openai),
            "moonshot" => Some(&self.moonshot),
            "dashscope" => Some(&self.dashscope),
            "vllm" => Some(&self.vllm),
            _ => None,
        }
    }

    pub fn get_mut_by_name(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        match name {
            "openrouter" => Some(&mut self.openrouter),
            "deepseek" => Some(&mut self.deepseek),
            "openai" => Some(&mut self.openai),
            "moonshot" => Some(&mut self.moonshot),
            "dashscope" => Some(&mut self.dashscope),
            "vllm" => Some(&mut self.vllm),
            _ => None,
        }
    }

    /// Convert to a map for use with the provider registry.
    pub fn to_map(&self) -> HashMap<String, ProviderConfig> {
        Self::NAMES
            .iter()
            .filter_map(|name| self.get_by_name(name).map(|c| (name.to_string(), c.clone())))
            .collect()
    }
}

// ─────────────────────────────────────────────
// Tool servers
// ─────────────────────────────────────────────

/// One tool server, launched as a child process speaking MCP over stdio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Namespace prefix for this server's tools (`{name}__{tool}`).
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Per-call timeout override; the agent's `toolCallTimeoutSecs` applies otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Result clip length in characters.
    pub result_max_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            timeout_secs: None,
            result_max_chars: 1200,
        }
    }
}

impl ServerConfig {
    /// Create a server entry with default limits.
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::new("local", "python", &["mcp_server.py"]),
        ServerConfig::new("fetch", "uvx", &["mcp-server-fetch"]),
    ]
}

// ─────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────

/// Startup catalog fetch retry policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogConfig {
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl CatalogConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

/// Live session eviction and persisted history settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionsConfig {
    /// Idle minutes before a live session is evicted.
    pub ttl_minutes: u64,
    /// Entries kept verbatim before folding into the summary.
    pub max_recent: usize,
    /// History file path. Defaults to `~/.toolweave/sessions.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_file: Option<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 30,
            max_recent: DEFAULT_MAX_RECENT,
            history_file: None,
        }
    }
}

impl SessionsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    /// Resolved history file path (`~` expanded).
    pub fn history_path(&self) -> PathBuf {
        match &self.history_file {
            Some(p) => crate::utils::expand_home(p),
            None => crate::utils::get_history_path(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
