//! Typed interpretation of a raw chat completion.
//!
//! The conversation loop never scans model text itself; it matches on
//! [`ModelReply`].

use std::sync::LazyLock;

use regex::Regex;
use toolweave_core::types::{LlmResponse, ToolCall};

pub use toolweave_core::config::FinalAnswerPolicy;

static FINAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<final_answer>|<final>").expect("invalid final-answer regex"));

/// What the model asked for.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    /// Execute these tools, then ask again. `content` is any accompanying prose.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// The turn is done.
    Final(String),
    /// Neither tools nor a final answer; keep going.
    Continue(String),
}

/// Whether `text` carries a final-answer tag.
pub fn has_final_marker(text: &str) -> bool {
    FINAL_MARKER.is_match(text)
}

/// Classify a raw response: tool calls win, then the final-answer policy,
/// otherwise `Continue`.
pub fn classify(response: LlmResponse, policy: FinalAnswerPolicy) -> ModelReply {
    if response.has_tool_calls() {
        let content = response.content.filter(|c| !c.trim().is_empty());
        return ModelReply::ToolCalls {
            content,
            calls: response.tool_calls,
        };
    }

    let text = response.content.unwrap_or_default();
    let is_final = match policy {
        FinalAnswerPolicy::Marker => has_final_marker(&text),
        FinalAnswerPolicy::AnyText => !text.trim().is_empty(),
    };

    if is_final {
        ModelReply::Final(text)
    } else {
        ModelReply::Continue(text)
    }
}
