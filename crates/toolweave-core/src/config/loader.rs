//! Config loader — reads `~/.toolweave/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.toolweave/config.json`
//! 3. Environment variables `TOOLWEAVE_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::schema::{Config, FinalAnswerPolicy, ProvidersConfig};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Read `TOOLWEAVE_<key>` and parse it, ignoring values that don't parse.
fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let name = format!("TOOLWEAVE_{key}");
    let raw = std::env::var(&name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `TOOLWEAVE_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `TOOLWEAVE_AGENT__MODEL`, `__MAX_TOKENS`, `__TEMPERATURE`, `__MAX_ROUNDS`,
///   `__MAX_TOOL_CALLS_PER_ROUND`, `__TOOL_CALL_TIMEOUT_SECS`, `__FINAL_ANSWER`
/// - `TOOLWEAVE_PROVIDERS__<NAME>__API_KEY` / `__API_BASE`
/// - `TOOLWEAVE_CATALOG__RETRIES`, `TOOLWEAVE_CATALOG__RETRY_DELAY_MS`
/// - `TOOLWEAVE_SESSIONS__TTL_MINUTES`, `__MAX_RECENT`, `__HISTORY_FILE`
fn apply_env_overrides(mut config: Config) -> Config {
    // Agent
    if let Some(val) = env_parsed::<String>("AGENT__MODEL") {
        config.agent.model = val;
    }
    if let Some(n) = env_parsed("AGENT__MAX_TOKENS") {
        config.agent.max_tokens = n;
    }
    if let Some(t) = env_parsed("AGENT__TEMPERATURE") {
        config.agent.temperature = t;
    }
    if let Some(n) = env_parsed("AGENT__MAX_ROUNDS") {
        config.agent.max_rounds = n;
    }
    if let Some(n) = env_parsed("AGENT__MAX_TOOL_CALLS_PER_ROUND") {
        config.agent.max_tool_calls_per_round = n;
    }
    if let Some(n) = env_parsed("AGENT__TOOL_CALL_TIMEOUT_SECS") {
        config.agent.tool_call_timeout_secs = n;
    }
    if let Some(val) = env_parsed::<String>("AGENT__FINAL_ANSWER") {
        match val.to_lowercase().as_str() {
            "marker" => config.agent.final_answer = FinalAnswerPolicy::Marker,
            "anytext" | "any_text" => config.agent.final_answer = FinalAnswerPolicy::AnyText,
            other => warn!("Unknown final answer policy {:?}, keeping {:?}", other, config.agent.final_answer),
        }
    }

    // Provider API keys (by provider name)
    for name in ProvidersConfig::NAMES {
        let upper = name.to_uppercase();
        if let Some(provider) = config.providers.get_mut_by_name(name) {
            if let Some(val) = env_parsed::<String>(&format!("PROVIDERS__{upper}__API_KEY")) {
                provider.api_key = val;
            }
            if let Some(val) = env_parsed::<String>(&format!("PROVIDERS__{upper}__API_BASE")) {
                provider.api_base = Some(val);
            }
        }
    }

    // Catalog
    if let Some(n) = env_parsed("CATALOG__RETRIES") {
        config.catalog.retries = n;
    }
    if let Some(n) = env_parsed("CATALOG__RETRY_DELAY_MS") {
        config.catalog.retry_delay_ms = n;
    }

    // Sessions
    if let Some(n) = env_parsed("SESSIONS__TTL_MINUTES") {
        config.sessions.ttl_minutes = n;
    }
    if let Some(n) = env_parsed("SESSIONS__MAX_RECENT") {
        config.sessions.max_recent = n;
    }
    if let Some(val) = env_parsed::<String>("SESSIONS__HISTORY_FILE") {
        config.sessions.history_file = Some(val);
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
