//! Context builder and transcript.
//!
//! The transcript is the ordered list of messages presented to the model.
//! It tracks which tool calls are still waiting for a result so a result can
//! never be attached to a call that was not made (or was already answered).

use thiserror::Error;
use toolweave_core::config::AgentConfig;
use toolweave_core::types::{Message, SessionRecord, ToolCall};
use tracing::debug;

// ─────────────────────────────────────────────
// System prompt
// ─────────────────────────────────────────────

/// Default ReAct-style instructions. The final-answer tags are what
/// `FinalAnswerPolicy::Marker` looks for.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a problem-solving assistant with access to tools.

Work in steps. In each reply, first think inside <thought></thought>, then either \
call exactly the tools you need or, once you have enough information, give the \
answer inside <final_answer></final_answer>.

Tools are named `server__tool`. Tool results come back to you as observations.

Rules:
- Do not give a <final_answer> while a tool call is still outstanding.
- Base the <final_answer> only on information from observations; do not invent facts. \
If the observations are insufficient, say so or call another tool.
- Do not repeat a tool call with the same arguments.
- If a tool times out or fails, try a different approach or a narrower query.";

/// Heading for the compacted summary of earlier turns.
const SUMMARY_HEADING: &str = "Summary of the earlier conversation:";

// ─────────────────────────────────────────────
// Context builder
// ─────────────────────────────────────────────

/// Builds transcripts for fresh and resumed conversations.
#[derive(Clone, Debug)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Use the configured system prompt override, if any.
    pub fn from_config(config: &AgentConfig) -> Self {
        match &config.system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => Self::new().with_system_prompt(prompt),
            _ => Self::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// A transcript holding only the system prompt.
    pub fn build_transcript(&self) -> Transcript {
        Transcript::new(&self.system_prompt)
    }

    /// A transcript rehydrated from a persisted record: the summary as a
    /// system entry, then the recent entries as user/assistant turns.
    pub fn hydrate(&self, record: &SessionRecord) -> Transcript {
        let mut transcript = self.build_transcript();
        let summary = record.summary.trim();
        if !summary.is_empty() {
            transcript.push(Message::system(format!("{SUMMARY_HEADING}\n{summary}")));
        }
        for entry in &record.recent {
            transcript.push(entry.to_message());
        }
        debug!(
            summary_chars = summary.chars().count(),
            recent = record.recent.len(),
            "hydrated transcript"
        );
        transcript
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// Transcript
// ─────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("tool result for unknown or already answered call '{0}'")]
    UnmatchedToolResult(String),
}

/// Ordered conversation state plus the ids of unanswered tool calls.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    pending: Vec<String>,
}

impl Transcript {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            pending: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids of tool calls recorded but not yet answered, in request order.
    pub fn pending_ids(&self) -> &[String] {
        &self.pending
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(Message::assistant(text));
    }

    /// Record an assistant turn requesting `calls`. Each id becomes pending.
    pub fn push_tool_calls(&mut self, content: Option<String>, calls: Vec<ToolCall>) {
        self.pending.extend(calls.iter().map(|c| c.id.clone()));
        self.push(Message::assistant_tool_calls(content, calls));
    }

    /// Attach the result of a pending call.
    pub fn push_tool_result(
        &mut self,
        id: &str,
        content: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        let Some(pos) = self.pending.iter().position(|p| p == id) else {
            return Err(TranscriptError::UnmatchedToolResult(id.to_string()));
        };
        self.pending.remove(pos);
        self.push(Message::tool_result(id, content));
        Ok(())
    }

    /// Answer every pending call with `text`. Returns how many were closed.
    pub fn close_pending(&mut self, text: &str) -> usize {
        let ids = std::mem::take(&mut self.pending);
        let closed = ids.len();
        for id in ids {
            self.push(Message::tool_result(id, text));
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolweave_core::types::HistoryEntry;

    #[test]
    fn test_default_prompt_mentions_final_answer() {
        let ctx = ContextBuilder::new();
        assert!(ctx.system_prompt().contains("<final_answer>"));
        assert!(ctx.system_prompt().contains("server__tool"));
    }

    #[test]
    fn test_from_config_override() {
        let mut config = AgentConfig::default();
        assert_eq!(ContextBuilder::from_config(&config).system_prompt(), DEFAULT_SYSTEM_PROMPT);

        config.system_prompt = Some("Be brief.".into());
        assert_eq!(ContextBuilder::from_config(&config).system_prompt(), "Be brief.");

        config.system_prompt = Some("   ".into());
        assert_eq!(ContextBuilder::from_config(&config).system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_build_transcript_starts_with_system() {
        let t = ContextBuilder::new().with_system_prompt("sys").build_transcript();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0], Message::system("sys"));
    }

    #[test]
    fn test_hydrate_summary_and_recent() {
        let record = SessionRecord {
            summary: "user: hello\nassistant: hi".into(),
            recent: vec![
                HistoryEntry::user("what's the weather?"),
                HistoryEntry::assistant("sunny", vec!["fetch__fetch".into()]),
            ],
        };
        let t = ContextBuilder::new().with_system_prompt("sys").hydrate(&record);
        let msgs = t.messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role(), "system");
        assert_eq!(msgs[1].role(), "system");
        assert!(msgs[1].text().starts_with(SUMMARY_HEADING));
        assert!(msgs[1].text().ends_with("assistant: hi"));
        assert_eq!(msgs[2], Message::user("what's the weather?"));
        assert_eq!(msgs[3], Message::assistant("sunny"));
    }

    #[test]
    fn test_hydrate_empty_record() {
        let t = ContextBuilder::new().hydrate(&SessionRecord::default());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_tool_result_must_match_pending_call() {
        let mut t = Transcript::new("sys");
        t.push_user("hi");
        t.push_tool_calls(
            None,
            vec![
                ToolCall::new("call_1", "local__echo", "{}"),
                ToolCall::new("call_2", "local__echo", r#"{"x":"y"}"#),
            ],
        );
        assert_eq!(t.pending_ids(), ["call_1", "call_2"]);

        assert_eq!(
            t.push_tool_result("call_9", "nope"),
            Err(TranscriptError::UnmatchedToolResult("call_9".into()))
        );
        t.push_tool_result("call_2", "second").unwrap();
        assert_eq!(t.pending_ids(), ["call_1"]);

        // Already answered.
        assert!(t.push_tool_result("call_2", "again").is_err());
        t.push_tool_result("call_1", "first").unwrap();
        assert!(t.pending_ids().is_empty());
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn test_close_pending() {
        let mut t = Transcript::new("sys");
        t.push_tool_calls(
            Some("checking".into()),
            vec![ToolCall::new("a", "local__echo", "{}"), ToolCall::new("b", "local__echo", "{}")],
        );
        t.push_tool_result("a", "done").unwrap();

        assert_eq!(t.close_pending("skipped"), 1);
        assert!(t.pending_ids().is_empty());
        assert_eq!(t.messages().last(), Some(&Message::tool_result("b", "skipped")));
        assert_eq!(t.close_pending("skipped"), 0);
    }
}
