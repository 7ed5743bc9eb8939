//! Toolweave Agent — conversation loop, tool registry, and sessions.
//!
//! This crate contains:
//! - **tools**: the registry that merges tool-server catalogs into one namespace
//! - **context**: system prompt, transcript, and rehydration from history
//! - **agent_loop**: the model ↔ tool-calling loop for one conversation
//! - **sessions**: live loops keyed by session id, with idle eviction

pub mod agent_loop;
pub mod context;
pub mod sessions;
pub mod tools;

pub use agent_loop::{ConversationLoop, LoopSettings, TurnOutcome, CANCELLED_MESSAGE, STALLED_MESSAGE};
pub use context::{ContextBuilder, Transcript, TranscriptError};
pub use sessions::{SessionHandle, SessionStore};
pub use tools::{RegistryError, ToolRegistry};
