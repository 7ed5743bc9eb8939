//! LLM Provider trait — the seam between the conversation loop and a model.
//!
//! The `HttpProvider` in `http_provider.rs` covers all OpenAI-compatible APIs;
//! tests substitute scripted implementations.

use async_trait::async_trait;
use tokio::sync::mpsc;
use toolweave_core::types::{Message, ToolDefinition};

use crate::error::ProviderError;
use crate::reply::{FinalAnswerPolicy, ModelReply};

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// How plain-text replies are classified.
    pub final_answer: FinalAnswerPolicy,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.3,
            final_answer: FinalAnswerPolicy::Marker,
        }
    }
}

impl From<&toolweave_core::config::AgentConfig> for LlmRequestConfig {
    fn from(agent: &toolweave_core::config::AgentConfig) -> Self {
        Self {
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
            final_answer: agent.final_answer,
        }
    }
}

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send the transcript and tool catalog, and classify the reply.
    ///
    /// # Arguments
    /// * `messages` — Conversation transcript in OpenAI format.
    /// * `tools`    — Tool definitions the model may call (may be empty).
    /// * `model`    — Model identifier (e.g. `"deepseek-chat"`, `"gpt-4o"`).
    /// * `config`   — Temperature, max_tokens, final-answer policy.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<ModelReply, ProviderError>;

    /// Stream a plain reply with no tools offered.
    ///
    /// Text pieces are sent on `deltas` as they arrive and the full text is
    /// returned at the end. Reading stops early if the receiver is dropped.
    /// The default sends a single piece from [`LlmProvider::complete`].
    async fn stream(
        &self,
        messages: &[Message],
        model: &str,
        config: &LlmRequestConfig,
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<String, ProviderError> {
        let text = match self.complete(messages, &[], model, config).await? {
            ModelReply::ToolCalls { content, .. } => content.unwrap_or_default(),
            ModelReply::Final(text) | ModelReply::Continue(text) => text,
        };
        if !text.is_empty() {
            let _ = deltas.send(text.clone());
        }
        Ok(text)
    }

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
