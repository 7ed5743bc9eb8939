//! Conversation loop — the model ↔ tool-calling cycle for one conversation.
//!
//! A turn appends the user's input, then alternates between asking the model
//! and running the tools it requests until the model gives a final answer,
//! the round limit is hit, or the turn is cancelled. The caller always gets
//! text back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolweave_core::config::AgentConfig;
use toolweave_core::types::ToolCall;
use toolweave_mcp::ToolOutput;
use toolweave_providers::{LlmProvider, LlmRequestConfig, ModelReply};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::Transcript;
use crate::tools::registry::ToolRegistry;

/// Returned when `max_rounds` pass without a final answer.
pub const STALLED_MESSAGE: &str = "The conversation reached its round limit without a final answer. \
A tool request may have timed out or an external service may be unreachable; \
please try again later or check the network/proxy.";

/// Returned when the turn's cancellation token fires.
pub const CANCELLED_MESSAGE: &str = "Conversation cancelled.";

/// Observation recorded for calls left unanswered by a cancelled turn.
pub const SKIPPED_MESSAGE: &str = "Tool call skipped: conversation cancelled";

// ─────────────────────────────────────────────
// Settings / outcome
// ─────────────────────────────────────────────

/// Knobs for one conversation loop.
#[derive(Clone, Debug)]
pub struct LoopSettings {
    /// Model identifier; empty means the provider's default.
    pub model: String,
    pub max_rounds: usize,
    pub max_tool_calls_per_round: usize,
    /// Fallback timeout for servers without their own.
    pub tool_timeout: Duration,
    pub request: LlmRequestConfig,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for LoopSettings {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            model: agent.model.clone(),
            max_rounds: agent.max_rounds,
            max_tool_calls_per_round: agent.max_tool_calls_per_round,
            tool_timeout: agent.tool_call_timeout(),
            request: LlmRequestConfig::from(agent),
        }
    }
}

/// Result of one turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text for the caller: the final answer, or an error/limit message.
    pub content: String,
    /// Qualified names of the tools run this turn, in order.
    pub tools: Vec<String>,
    /// Observation texts, in the same order as `tools`.
    pub tool_results: Vec<String>,
}

// ─────────────────────────────────────────────
// ConversationLoop
// ─────────────────────────────────────────────

pub struct ConversationLoop {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    settings: LoopSettings,
    model: String,
    transcript: Transcript,
}

impl ConversationLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        settings: LoopSettings,
        transcript: Transcript,
    ) -> Self {
        let model = if settings.model.is_empty() {
            provider.default_model().to_string()
        } else {
            settings.model.clone()
        };
        Self {
            provider,
            tools,
            settings,
            model,
            transcript,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn for `input`.
    pub async fn turn(&mut self, input: &str, cancel: &CancellationToken) -> TurnOutcome {
        self.transcript.push_user(input);
        let mut outcome = TurnOutcome::default();

        for round in 1..=self.settings.max_rounds {
            if cancel.is_cancelled() {
                return self.cancelled(outcome);
            }

            let definitions = self.tools.definitions().await;
            debug!(round, tools = definitions.len(), model = %self.model, "requesting completion");

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(outcome),
                reply = self.provider.complete(
                    self.transcript.messages(),
                    &definitions,
                    &self.model,
                    &self.settings.request,
                ) => reply,
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(round, error = %e, "model request failed");
                    outcome.content = format!("Model request failed: {e}");
                    return outcome;
                }
            };

            match reply {
                ModelReply::Final(text) => {
                    self.transcript.push_assistant(text.clone());
                    outcome.content = with_observations(text, &outcome.tool_results);
                    info!(round, tools = outcome.tools.len(), "turn finished");
                    return outcome;
                }
                ModelReply::Continue(text) => {
                    debug!(round, "no tool calls and no final answer; asking again");
                    self.transcript.push_assistant(text);
                }
                ModelReply::ToolCalls { content, calls } => {
                    let accepted = self.accept_calls(calls);
                    self.transcript.push_tool_calls(content, accepted.clone());
                    if !self.run_calls(accepted, cancel, &mut outcome).await {
                        return self.cancelled(outcome);
                    }
                }
            }
        }

        warn!(max_rounds = self.settings.max_rounds, "turn stalled");
        outcome.content = STALLED_MESSAGE.to_string();
        outcome
    }

    /// Stream a plain reply for `input`. No tools are offered.
    ///
    /// `on_delta` sees each text piece as it arrives. When cancelled, the text
    /// received so far is kept as the assistant reply.
    pub async fn stream_turn<F>(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> TurnOutcome
    where
        F: FnMut(&str) + Send,
    {
        self.transcript.push_user(input);
        let mut text = String::new();
        let mut cancelled = cancel.is_cancelled();
        let mut failure = None;

        if !cancelled {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let request = self.provider.stream(
                self.transcript.messages(),
                &self.model,
                &self.settings.request,
                tx,
            );
            tokio::pin!(request);
            let mut finished = false;

            // Pieces are drained until the request drops its sender.
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    piece = rx.recv() => match piece {
                        Some(piece) => {
                            on_delta(&piece);
                            text.push_str(&piece);
                        }
                        None => break,
                    },
                    result = &mut request, if !finished => {
                        finished = true;
                        if let Err(e) = result {
                            failure = Some(e);
                        }
                    }
                }
            }
        }

        if !text.is_empty() {
            self.transcript.push_assistant(text.clone());
        }

        let content = if let Some(e) = failure {
            warn!(error = %e, "streamed model request failed");
            format!("Model request failed: {e}")
        } else if cancelled {
            info!(chars = text.chars().count(), "streamed turn cancelled");
            if text.is_empty() {
                CANCELLED_MESSAGE.to_string()
            } else {
                text
            }
        } else {
            info!(chars = text.chars().count(), "streamed turn finished");
            text
        };

        TurnOutcome {
            content,
            ..TurnOutcome::default()
        }
    }

    /// Drop duplicate (name, arguments) pairs, cap the round, and make sure
    /// every call has a unique id.
    fn accept_calls(&self, calls: Vec<ToolCall>) -> Vec<ToolCall> {
        let requested = calls.len();
        let mut seen = HashSet::new();
        let mut ids = HashSet::new();
        let mut accepted = Vec::new();

        for mut call in calls {
            if accepted.len() >= self.settings.max_tool_calls_per_round {
                break;
            }
            if !seen.insert(call.dedup_key()) {
                continue;
            }
            if call.id.is_empty() || ids.contains(&call.id) {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }
            ids.insert(call.id.clone());
            accepted.push(call);
        }

        if accepted.len() < requested {
            debug!(requested, accepted = accepted.len(), "dropped duplicate or excess tool calls");
        }
        accepted
    }

    /// Execute `calls` in order. Returns `false` if cancelled part-way.
    async fn run_calls(
        &mut self,
        calls: Vec<ToolCall>,
        cancel: &CancellationToken,
        outcome: &mut TurnOutcome,
    ) -> bool {
        for call in calls {
            if cancel.is_cancelled() {
                return false;
            }

            let name = call.function.name.clone();
            info!(tool = %name, args = %call.function.arguments, "executing tool call");

            let output = match call.parse_arguments() {
                Err(reason) => ToolOutput::error(format!("Invalid arguments for {name}: {reason}")),
                Ok(arguments) => {
                    let tools = Arc::clone(&self.tools);
                    let qualified = name.clone();
                    let timeout = self.settings.tool_timeout;
                    let task = tokio::spawn(async move {
                        tools.invoke(&qualified, arguments, timeout).await
                    });
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!(tool = %name, "cancelled while tool call in flight");
                            return false;
                        }
                        joined = task => joined.unwrap_or_else(|e| {
                            ToolOutput::error(format!("Tool call failed: {e}"))
                        }),
                    }
                }
            };

            debug!(tool = %name, is_error = output.is_error, chars = output.text.len(), "tool result");
            if let Err(e) = self.transcript.push_tool_result(&call.id, output.text.clone()) {
                warn!(error = %e, "dropping tool result");
            }
            outcome.tools.push(name);
            outcome.tool_results.push(output.text);
        }
        true
    }

    fn cancelled(&mut self, mut outcome: TurnOutcome) -> TurnOutcome {
        let skipped = self.transcript.close_pending(SKIPPED_MESSAGE);
        info!(skipped, "turn cancelled");
        outcome.content = CANCELLED_MESSAGE.to_string();
        outcome
    }
}

/// Append observations the final answer does not already quote.
fn with_observations(text: String, observations: &[String]) -> String {
    let missing: Vec<String> = observations
        .iter()
        .filter(|obs| !obs.trim().is_empty() && !text.contains(obs.as_str()))
        .map(|obs| format!("<observation>{obs}</observation>"))
        .collect();
    if missing.is_empty() {
        text
    } else {
        format!("{text}\n{}", missing.join("\n"))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use toolweave_core::types::{Message, ToolDefinition};
    use toolweave_mcp::{ToolDescriptor, ToolServer};
    use toolweave_providers::ProviderError;

    use crate::context::ContextBuilder;
    use crate::tools::registry::tests::EchoServer;

    /// Provider that replays scripted replies, then keeps asking to continue.
    pub(crate) struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
        pub calls: AtomicUsize,
        /// Cancel this token when serving the given (1-based) call.
        cancel_on: Option<(usize, CancellationToken)>,
        pub seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(replies: Vec<ModelReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(Ok).collect()),
                calls: AtomicUsize::new(0),
                cancel_on: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: ProviderError) -> Self {
            let provider = Self::new(Vec::new());
            provider.replies.lock().unwrap().push_back(Err(error));
            provider
        }

        fn cancel_on(mut self, call: usize, token: CancellationToken) -> Self {
            self.cancel_on = Some((call, token));
            self
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolDefinition],
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> Result<ModelReply, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(messages.to_vec());
            if let Some((at, token)) = &self.cancel_on {
                if *at == n {
                    token.cancel();
                }
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelReply::Continue(String::new())))
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn display_name(&self) -> &str {
            "ScriptedProvider"
        }
    }

    /// Streams the given pieces, then stalls until dropped.
    struct TrickleProvider {
        pieces: Vec<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for TrickleProvider {
        async fn complete(
            &self,
            _: &[Message],
            _: &[ToolDefinition],
            _: &str,
            _: &LlmRequestConfig,
        ) -> Result<ModelReply, ProviderError> {
            Err(ProviderError::Empty)
        }

        async fn stream(
            &self,
            _: &[Message],
            _: &str,
            _: &LlmRequestConfig,
            deltas: mpsc::UnboundedSender<String>,
        ) -> Result<String, ProviderError> {
            for piece in &self.pieces {
                let _ = deltas.send(piece.to_string());
            }
            std::future::pending().await
        }

        fn default_model(&self) -> &str {
            "trickle"
        }

        fn display_name(&self) -> &str {
            "TrickleProvider"
        }
    }

    /// Server whose only tool sleeps before answering.
    pub(crate) struct SlowServer {
        pub started: AtomicUsize,
    }

    #[async_trait]
    impl ToolServer for SlowServer {
        fn name(&self) -> &str {
            "slow"
        }

        async fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor::new("wait", "Sleeps", Value::Null)]
        }

        async fn call_tool(&self, _: &str, _: Map<String, Value>, _: Duration) -> ToolOutput {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            ToolOutput::ok("late")
        }
    }

    pub(crate) fn echo_call(id: &str, x: &str) -> ToolCall {
        ToolCall::new(id, "local__echo", json!({"x": x}).to_string())
    }

    pub(crate) fn calls(calls: Vec<ToolCall>) -> ModelReply {
        ModelReply::ToolCalls {
            content: None,
            calls,
        }
    }

    fn registry_with(server: Arc<EchoServer>) -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(server).unwrap();
        Arc::new(reg)
    }

    fn new_loop(provider: Arc<ScriptedProvider>, tools: Arc<ToolRegistry>) -> ConversationLoop {
        ConversationLoop::new(
            provider,
            tools,
            LoopSettings::default(),
            ContextBuilder::new().build_transcript(),
        )
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![ModelReply::Final(
            "<final_answer>42</final_answer>".into(),
        )]));
        let server = Arc::new(EchoServer::new("local"));
        let mut agent = new_loop(provider.clone(), registry_with(server));

        let out = agent.turn("question", &CancellationToken::new()).await;
        assert_eq!(out.content, "<final_answer>42</final_answer>");
        assert!(out.tools.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let msgs = agent.transcript().messages();
        assert_eq!(msgs[1], Message::user("question"));
        assert_eq!(msgs[2], Message::assistant("<final_answer>42</final_answer>"));
    }

    #[tokio::test]
    async fn test_tool_round_then_final_appends_observations() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(vec![echo_call("c1", "sunny")]),
            ModelReply::Final("<final_answer>done</final_answer>".into()),
        ]));
        let server = Arc::new(EchoServer::new("local"));
        let mut agent = new_loop(provider.clone(), registry_with(server.clone()));

        let out = agent.turn("weather?", &CancellationToken::new()).await;
        assert_eq!(out.tools, vec!["local__echo"]);
        assert_eq!(out.tool_results, vec!["sunny"]);
        assert_eq!(
            out.content,
            "<final_answer>done</final_answer>\n<observation>sunny</observation>"
        );

        // The second request saw the call and its result.
        let seen = provider.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second[second.len() - 1], Message::tool_result("c1", "sunny"));
        assert!(agent.transcript().pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_final_answer_quoting_observation_is_unchanged() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(vec![echo_call("c1", "sunny")]),
            ModelReply::Final("<final_answer>It is sunny</final_answer>".into()),
        ]));
        let mut agent = new_loop(provider, registry_with(Arc::new(EchoServer::new("local"))));

        let out = agent.turn("weather?", &CancellationToken::new()).await;
        assert_eq!(out.content, "<final_answer>It is sunny</final_answer>");
    }

    #[tokio::test]
    async fn test_duplicate_calls_collapse_and_cap() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(vec![
                echo_call("c1", "a"),
                ToolCall::new("c2", "local__echo", r#"{ "x" : "a" }"#),
                echo_call("c3", "b"),
                echo_call("c4", "c"),
                echo_call("c5", "d"),
            ]),
            ModelReply::Final("<final>ok</final>".into()),
        ]));
        let server = Arc::new(EchoServer::new("local"));
        let mut agent = new_loop(provider, registry_with(server.clone()));

        let out = agent.turn("go", &CancellationToken::new()).await;
        assert_eq!(server.tool_calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.tool_results, vec!["a", "b", "c"]);

        // Only accepted calls are recorded on the assistant entry.
        let recorded = agent
            .transcript()
            .messages()
            .iter()
            .find_map(|m| match m {
                Message::Assistant {
                    tool_calls: Some(calls),
                    ..
                } => Some(calls.clone()),
                _ => None,
            })
            .unwrap();
        let ids: Vec<&str> = recorded.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3", "c4"]);
    }

    #[tokio::test]
    async fn test_malformed_arguments_become_error_observation() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(vec![ToolCall::new("c1", "local__echo", "{not json")]),
            ModelReply::Final("<final_answer>sorry</final_answer>".into()),
        ]));
        let server = Arc::new(EchoServer::new("local"));
        let mut agent = new_loop(provider, registry_with(server.clone()));

        let out = agent.turn("go", &CancellationToken::new()).await;
        assert_eq!(server.tool_calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.tool_results.len(), 1);
        assert!(out.tool_results[0].starts_with("Invalid arguments for local__echo"));
        assert!(agent.transcript().pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_missing_call_id_is_generated() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(vec![echo_call("", "x")]),
            ModelReply::Final("<final_answer>x</final_answer>".into()),
        ]));
        let mut agent = new_loop(provider, registry_with(Arc::new(EchoServer::new("local"))));

        agent.turn("go", &CancellationToken::new()).await;
        let tool_ids: Vec<String> = agent
            .transcript()
            .messages()
            .iter()
            .filter_map(|m| match m {
                Message::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_ids.len(), 1);
        assert!(tool_ids[0].starts_with("call_"));
    }

    #[tokio::test]
    async fn test_routing_errors_are_observations() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(vec![
                ToolCall::new("c1", "ghost__echo", "{}"),
                ToolCall::new("c2", "echo", "{}"),
            ]),
            ModelReply::Final("<final_answer>n/a</final_answer>".into()),
        ]));
        let mut agent = new_loop(provider, registry_with(Arc::new(EchoServer::new("local"))));

        let out = agent.turn("go", &CancellationToken::new()).await;
        assert_eq!(
            out.tool_results,
            vec![
                "Unknown tool server: ghost",
                "Tool name is missing a server prefix: echo"
            ]
        );
    }

    #[tokio::test]
    async fn test_stalls_after_max_rounds() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let mut agent = new_loop(provider.clone(), registry_with(Arc::new(EchoServer::new("local"))));

        let out = agent.turn("loop forever", &CancellationToken::new()).await;
        assert_eq!(out.content, STALLED_MESSAGE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_continue_appends_placeholder() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ModelReply::Continue(String::new()),
            ModelReply::Final("<final_answer>ok</final_answer>".into()),
        ]));
        let mut agent = new_loop(provider, registry_with(Arc::new(EchoServer::new("local"))));

        agent.turn("go", &CancellationToken::new()).await;
        let msgs = agent.transcript().messages();
        assert_eq!(msgs[2], Message::assistant(""));
    }

    #[tokio::test]
    async fn test_model_failure_ends_turn() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Status {
            status: 503,
            body: "overloaded".into(),
        }));
        let mut agent = new_loop(provider.clone(), registry_with(Arc::new(EchoServer::new("local"))));

        let out = agent.turn("go", &CancellationToken::new()).await;
        assert_eq!(out.content, "Model request failed: API returned 503: overloaded");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_round_two_tools() {
        let token = CancellationToken::new();
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                calls(vec![echo_call("c1", "one")]),
                calls(vec![echo_call("c2", "two"), echo_call("c3", "three")]),
            ])
            .cancel_on(2, token.clone()),
        );
        let server = Arc::new(EchoServer::new("local"));
        let mut agent = new_loop(provider.clone(), registry_with(server.clone()));

        let out = agent.turn("go", &token).await;
        assert_eq!(out.content, CANCELLED_MESSAGE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        // Only round one's call ran.
        assert_eq!(server.tool_calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.tools, vec!["local__echo"]);

        // Round two's requests were closed so the transcript stays well formed.
        let t = agent.transcript();
        assert!(t.pending_ids().is_empty());
        let skipped: Vec<&Message> = t
            .messages()
            .iter()
            .filter(|m| m.text() == SKIPPED_MESSAGE)
            .collect();
        assert_eq!(skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_already_set() {
        let token = CancellationToken::new();
        token.cancel();
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let mut agent = new_loop(provider.clone(), registry_with(Arc::new(EchoServer::new("local"))));

        let out = agent.turn("go", &token).await;
        assert_eq!(out.content, CANCELLED_MESSAGE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_tool() {
        let token = CancellationToken::new();
        let provider = Arc::new(ScriptedProvider::new(vec![calls(vec![ToolCall::new(
            "c1",
            "slow__wait",
            "{}",
        )])]));
        let server = Arc::new(SlowServer {
            started: AtomicUsize::new(0),
        });
        let mut reg = ToolRegistry::new();
        reg.register(server.clone()).unwrap();
        let mut agent = new_loop(provider, Arc::new(reg));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let out = agent.turn("go", &token).await;
        assert_eq!(out.content, CANCELLED_MESSAGE);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(server.started.load(Ordering::SeqCst), 1);
        assert!(out.tool_results.is_empty());
        assert_eq!(
            agent.transcript().messages().last(),
            Some(&Message::tool_result("c1", SKIPPED_MESSAGE))
        );
    }

    #[tokio::test]
    async fn test_stream_turn_records_full_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![ModelReply::Continue(
            "Hello there".into(),
        )]));
        let mut agent = new_loop(provider.clone(), Arc::new(ToolRegistry::new()));

        let mut pieces = Vec::new();
        let out = agent
            .stream_turn("hi", &CancellationToken::new(), |p| pieces.push(p.to_string()))
            .await;
        assert_eq!(out.content, "Hello there");
        assert!(out.tools.is_empty());
        assert_eq!(pieces, vec!["Hello there"]);

        let msgs = agent.transcript().messages();
        assert_eq!(msgs[msgs.len() - 2], Message::user("hi"));
        assert_eq!(msgs[msgs.len() - 1], Message::assistant("Hello there"));
    }

    #[tokio::test]
    async fn test_stream_turn_cancel_keeps_partial_text() {
        let provider = Arc::new(TrickleProvider {
            pieces: vec!["par", "tial", "never"],
        });
        let mut agent = ConversationLoop::new(
            provider,
            Arc::new(ToolRegistry::new()),
            LoopSettings::default(),
            ContextBuilder::new().build_transcript(),
        );

        let cancel = CancellationToken::new();
        let mut pieces = Vec::new();
        let out = agent
            .stream_turn("go", &cancel, |p| {
                pieces.push(p.to_string());
                if pieces.len() == 2 {
                    cancel.cancel();
                }
            })
            .await;
        assert_eq!(pieces, vec!["par", "tial"]);
        assert_eq!(out.content, "partial");
        assert_eq!(
            agent.transcript().messages().last(),
            Some(&Message::assistant("partial"))
        );
    }

    #[tokio::test]
    async fn test_stream_turn_already_cancelled() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let mut agent = new_loop(provider.clone(), Arc::new(ToolRegistry::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = agent.stream_turn("hi", &cancel, |_| {}).await;
        assert_eq!(out.content, CANCELLED_MESSAGE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(agent.transcript().messages().last(), Some(&Message::user("hi")));
    }

    #[tokio::test]
    async fn test_stream_turn_failure() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Empty));
        let mut agent = new_loop(provider, Arc::new(ToolRegistry::new()));
        let out = agent.stream_turn("hi", &CancellationToken::new(), |_| {}).await;
        assert_eq!(out.content, "Model request failed: response contained no choices");
    }

    #[test]
    fn test_with_observations_skips_blank_and_quoted() {
        let obs = vec!["alpha".to_string(), "  ".to_string(), "beta".to_string()];
        assert_eq!(
            with_observations("answer mentions alpha".into(), &obs),
            "answer mentions alpha\n<observation>beta</observation>"
        );
        assert_eq!(with_observations("plain".into(), &[]), "plain");
    }

    #[test]
    fn test_settings_from_config() {
        let settings = LoopSettings::default();
        assert_eq!(settings.max_rounds, 10);
        assert_eq!(settings.max_tool_calls_per_round, 3);
        assert_eq!(settings.tool_timeout, Duration::from_secs(20));
        assert_eq!(settings.model, "deepseek-chat");
    }

    #[test]
    fn test_settings_follow_agent_config() {
        let agent = AgentConfig {
            model: "gpt-4o".into(),
            max_rounds: 4,
            max_tool_calls_per_round: 2,
            tool_call_timeout_secs: 7,
            ..AgentConfig::default()
        };
        let settings = LoopSettings::from(&agent);
        assert_eq!(settings.max_rounds, 4);
        assert_eq!(settings.max_tool_calls_per_round, 2);
        assert_eq!(settings.tool_timeout, Duration::from_secs(7));
        assert_eq!(settings.model, "gpt-4o");
    }

    #[test]
    fn test_empty_model_uses_provider_default() {
        let settings = LoopSettings {
            model: String::new(),
            ..LoopSettings::default()
        };
        let agent = ConversationLoop::new(
            Arc::new(ScriptedProvider::new(Vec::new())),
            Arc::new(ToolRegistry::new()),
            settings,
            ContextBuilder::new().build_transcript(),
        );
        assert_eq!(agent.model(), "mock-model");
    }
}
