//! Durable session history.
//!
//! Each session is stored as a compacted `{summary, recent}` record inside one
//! JSON file (`~/.toolweave/sessions.json` by default). Live conversation
//! state is owned by the agent crate; this module only persists it.

pub mod history;

pub use history::{compact, HistoryError, HistoryStore, DEFAULT_MAX_RECENT};
