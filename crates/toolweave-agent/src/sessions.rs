//! Session store — live conversation loops keyed by session id.
//!
//! Live loops are evicted after a period of inactivity. Every finished turn
//! is also appended to the durable [`HistoryStore`], so an evicted (or
//! never-seen-in-this-process) session resumes from its compacted history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use toolweave_core::config::Config;
use toolweave_core::session::{HistoryError, HistoryStore};
use toolweave_core::types::{HistoryEntry, SessionRecord};
use toolweave_providers::LlmProvider;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent_loop::{ConversationLoop, LoopSettings, TurnOutcome};
use crate::context::ContextBuilder;
use crate::tools::registry::ToolRegistry;

/// Default idle time before a live session is dropped.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

// ─────────────────────────────────────────────
// SessionHandle
// ─────────────────────────────────────────────

/// One live session. Turns are serialized by the inner async mutex.
pub struct SessionHandle {
    id: String,
    conversation: tokio::sync::Mutex<ConversationLoop>,
    history: Arc<HistoryStore>,
    last_activity: Mutex<Instant>,
    in_flight: Mutex<Option<CancellationToken>>,
    /// Set once the session is deleted; later turns are not persisted.
    deleted: AtomicBool,
}

impl SessionHandle {
    fn new(id: String, conversation: ConversationLoop, history: Arc<HistoryStore>) -> Self {
        Self {
            id,
            conversation: tokio::sync::Mutex::new(conversation),
            history,
            last_activity: Mutex::new(Instant::now()),
            in_flight: Mutex::new(None),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run one turn, then persist `{user, assistant}` for it.
    ///
    /// A turn waits for any earlier turn on this session to finish.
    pub async fn turn(&self, text: &str, cancel: CancellationToken) -> TurnOutcome {
        let mut conversation = self.conversation.lock().await;
        self.touch();
        self.set_in_flight(Some(cancel.clone()));

        let outcome = conversation.turn(text, &cancel).await;

        self.set_in_flight(None);
        self.touch();

        self.persist(text, &outcome).await;
        outcome
    }

    /// Like [`SessionHandle::turn`], but streams a plain reply through
    /// `on_delta` without offering tools.
    pub async fn stream_turn<F>(
        &self,
        text: &str,
        cancel: CancellationToken,
        on_delta: F,
    ) -> TurnOutcome
    where
        F: FnMut(&str) + Send,
    {
        let mut conversation = self.conversation.lock().await;
        self.touch();
        self.set_in_flight(Some(cancel.clone()));

        let outcome = conversation.stream_turn(text, &cancel, on_delta).await;

        self.set_in_flight(None);
        self.touch();

        self.persist(text, &outcome).await;
        outcome
    }

    async fn persist(&self, text: &str, outcome: &TurnOutcome) {
        if self.deleted.load(Ordering::SeqCst) {
            debug!(session = %self.id, "session deleted during turn; not persisting");
            return;
        }
        let entries = vec![
            HistoryEntry::user(text),
            HistoryEntry::assistant(outcome.content.clone(), outcome.tools.clone()),
        ];
        if let Err(e) = self.history.append(&self.id, entries).await {
            warn!(session = %self.id, error = %e, "failed to persist session history");
        }
    }

    /// Cancel the turn in flight, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(token) => {
                info!(session = %self.id, "cancelling turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a turn is currently running.
    pub fn is_busy(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn set_in_flight(&self, token: Option<CancellationToken>) {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

// ─────────────────────────────────────────────
// SessionStore
// ─────────────────────────────────────────────

pub struct SessionStore {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    settings: LoopSettings,
    context: ContextBuilder,
    history: Arc<HistoryStore>,
    ttl: Duration,
    live: tokio::sync::Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        settings: LoopSettings,
        context: ContextBuilder,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            provider,
            tools,
            settings,
            context,
            history,
            ttl: DEFAULT_TTL,
            live: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Build a store from the loaded configuration.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let history = HistoryStore::new(config.sessions.history_path(), config.sessions.max_recent);
        Self::new(
            provider,
            tools,
            LoopSettings::from(&config.agent),
            ContextBuilder::from_config(&config.agent),
            Arc::new(history),
        )
        .with_ttl(config.sessions.ttl())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Return the live session for `id`, or build one from persisted history.
    /// Without an id a fresh UUID v4 is assigned.
    pub async fn new_or_resume(&self, id: Option<&str>) -> (String, Arc<SessionHandle>) {
        let id = match id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        {
            let mut live = self.live.lock().await;
            self.evict_idle(&mut live);
            if let Some(handle) = live.get(&id) {
                handle.touch();
                return (id, Arc::clone(handle));
            }
        }

        // Read history without holding the map lock.
        let record = self.history.load(&id).await;

        let mut live = self.live.lock().await;
        if let Some(handle) = live.get(&id) {
            handle.touch();
            return (id, Arc::clone(handle));
        }
        let handle = Arc::new(self.build_handle(&id, &record));
        info!(
            session = %id,
            resumed = !record.recent.is_empty() || !record.summary.is_empty(),
            "session opened"
        );
        live.insert(id.clone(), Arc::clone(&handle));
        (id, handle)
    }

    fn build_handle(&self, id: &str, record: &SessionRecord) -> SessionHandle {
        let conversation = ConversationLoop::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            self.settings.clone(),
            self.context.hydrate(record),
        );
        SessionHandle::new(id.to_string(), conversation, Arc::clone(&self.history))
    }

    fn evict_idle(&self, live: &mut HashMap<String, Arc<SessionHandle>>) {
        let before = live.len();
        live.retain(|id, handle| {
            let keep = handle.is_busy() || handle.last_activity().elapsed() <= self.ttl;
            if !keep {
                debug!(session = %id, "evicting idle session");
            }
            keep
        });
        let evicted = before - live.len();
        if evicted > 0 {
            info!(evicted, "evicted idle sessions");
        }
    }

    /// Cancel the turn in flight for `id`. Returns whether one was running.
    pub async fn cancel(&self, id: &str) -> bool {
        match self.live.lock().await.get(id) {
            Some(handle) => handle.cancel(),
            None => false,
        }
    }

    /// Drop live state and the persisted record for `id`.
    /// Returns whether anything existed.
    ///
    /// A turn in flight is cancelled and awaited first, so it cannot write
    /// the record back after it is removed.
    pub async fn delete(&self, id: &str) -> Result<bool, HistoryError> {
        let removed = self.live.lock().await.remove(id);
        let was_live = removed.is_some();
        if let Some(handle) = removed {
            handle.deleted.store(true, Ordering::SeqCst);
            handle.cancel();
            let _idle = handle.conversation.lock().await;
        }
        let was_persisted = self.history.delete(id).await?;
        info!(session = %id, was_live, was_persisted, "session deleted");
        Ok(was_live || was_persisted)
    }

    /// Number of live (not yet evicted) sessions.
    pub async fn live_count(&self) -> usize {
        self.live.lock().await.len()
    }
}
