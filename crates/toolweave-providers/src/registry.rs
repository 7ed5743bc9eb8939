//! Provider registry — static specs for the supported OpenAI-compatible APIs.
//!
//! Each `ProviderSpec` describes how to reach one provider: keywords for
//! model matching, the default API base, and per-model quirks.

use std::collections::HashMap;

/// Re-export the provider config from core.
pub use toolweave_core::config::ProviderConfig;

// ─────────────────────────────────────────────
// ProviderSpec — static metadata for one provider
// ─────────────────────────────────────────────

/// Static specification describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal name, matching the config section (e.g. `"deepseek"`).
    pub name: &'static str,
    /// Keywords to match in model names (lowercase).
    pub keywords: &'static [&'static str],
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Gateways accept any model and are used when nothing matches directly.
    pub is_gateway: bool,
    /// Self-hosted endpoint; needs an explicit `apiBase`.
    pub is_local: bool,
    /// Default API base URL.
    pub default_api_base: &'static str,
    /// Per-model parameter overrides.
    pub model_overrides: &'static [ModelOverride],
}

/// A per-model parameter override.
#[derive(Clone, Debug)]
pub struct ModelOverride {
    /// Substring to match in the lowercase model name.
    pub pattern: &'static str,
    pub field: OverrideField,
    pub value: f64,
}

/// Fields that can be overridden per model.
#[derive(Clone, Debug)]
pub enum OverrideField {
    Temperature,
}

// ─────────────────────────────────────────────
// Providers, in matching priority order
// ─────────────────────────────────────────────

pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openrouter",
        keywords: &["openrouter"],
        display_name: "OpenRouter",
        is_gateway: true,
        is_local: false,
        default_api_base: "https://openrouter.ai/api/v1",
        model_overrides: &[],
    },
    ProviderSpec {
        name: "deepseek",
        keywords: &["deepseek"],
        display_name: "DeepSeek",
        is_gateway: false,
        is_local: false,
        default_api_base: "https://api.deepseek.com/v1",
        model_overrides: &[],
    },
    ProviderSpec {
        name: "openai",
        keywords: &["openai", "gpt", "o1-", "o3-"],
        display_name: "OpenAI",
        is_gateway: false,
        is_local: false,
        default_api_base: "https://api.openai.com/v1",
        model_overrides: &[],
    },
    // Kimi K2.5 rejects temperatures below 1.0
    ProviderSpec {
        name: "moonshot",
        keywords: &["moonshot", "kimi"],
        display_name: "Moonshot",
        is_gateway: false,
        is_local: false,
        default_api_base: "https://api.moonshot.ai/v1",
        model_overrides: &[ModelOverride {
            pattern: "kimi-k2.5",
            field: OverrideField::Temperature,
            value: 1.0,
        }],
    },
    ProviderSpec {
        name: "dashscope",
        keywords: &["qwen", "dashscope"],
        display_name: "DashScope",
        is_gateway: false,
        is_local: false,
        default_api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        model_overrides: &[],
    },
    ProviderSpec {
        name: "vllm",
        keywords: &["vllm"],
        display_name: "vLLM",
        is_gateway: false,
        is_local: true,
        default_api_base: "http://localhost:8000/v1",
        model_overrides: &[],
    },
];

// ─────────────────────────────────────────────
// Matching functions
// ─────────────────────────────────────────────

/// Find a provider spec by matching keywords against a model name.
///
/// Skips gateways and local providers; those are fallback only.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model_lower = model.to_lowercase();
    PROVIDERS.iter().find(|spec| {
        !spec.is_gateway
            && !spec.is_local
            && spec.keywords.iter().any(|kw| model_lower.contains(kw))
    })
}

/// Find a provider spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Apply per-model overrides to the request temperature.
pub fn apply_model_overrides(model: &str, spec: &ProviderSpec, temperature: f64) -> f64 {
    let model_lower = model.to_lowercase();
    let mut temp = temperature;

    for ovr in spec.model_overrides {
        if model_lower.contains(ovr.pattern) {
            match ovr.field {
                OverrideField::Temperature => temp = ovr.value,
            }
        }
    }

    temp
}

/// Match a model name to a configured provider.
///
/// 1. Keyword match, only if that provider has an API key.
/// 2. The first configured gateway.
/// 3. A configured local endpoint with an explicit `apiBase`.
pub fn match_provider<'a>(
    model: &str,
    providers: &'a HashMap<String, ProviderConfig>,
) -> Option<(&'a ProviderConfig, &'static ProviderSpec)> {
    if let Some(spec) = find_by_model(model) {
        if let Some(config) = providers.get(spec.name).filter(|c| c.is_configured()) {
            return Some((config, spec));
        }
    }

    let gateway = PROVIDERS.iter().filter(|s| s.is_gateway).find_map(|spec| {
        providers
            .get(spec.name)
            .filter(|c| c.is_configured())
            .map(|c| (c, spec))
    });
    if gateway.is_some() {
        return gateway;
    }

    PROVIDERS.iter().filter(|s| s.is_local).find_map(|spec| {
        providers
            .get(spec.name)
            .filter(|c| c.is_configured() && c.api_base.is_some())
            .map(|c| (c, spec))
    })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
