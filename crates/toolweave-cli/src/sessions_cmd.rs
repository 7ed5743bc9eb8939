//! `toolweave sessions` — inspect and delete persisted session history.
//!
//! Works on the history file directly; no model or tool server is started.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use toolweave_core::config::load_config;
use toolweave_core::session::HistoryStore;
use toolweave_core::types::SessionRecord;

use crate::helpers::display_path;

#[derive(Subcommand)]
pub enum SessionsCommands {
    /// List persisted session ids
    List,

    /// Show the compacted history of a session
    Show {
        /// Session id
        id: String,
    },

    /// Delete a session's persisted history
    Delete {
        /// Session id
        id: String,
    },
}

pub async fn dispatch(action: SessionsCommands) -> Result<()> {
    let config = load_config(None);
    let store = HistoryStore::new(config.sessions.history_path(), config.sessions.max_recent);

    match action {
        SessionsCommands::List => list(&store).await,
        SessionsCommands::Show { id } => show(&store, &id).await,
        SessionsCommands::Delete { id } => delete(&store, &id).await,
    }
}

async fn list(store: &HistoryStore) -> Result<()> {
    let ids = store.ids().await;
    if ids.is_empty() {
        println!("No sessions in {}", display_path(store.path()));
        return Ok(());
    }
    for id in &ids {
        println!("  {id}");
    }
    println!("\n{} session(s) in {}", ids.len(), display_path(store.path()));
    Ok(())
}

async fn show(store: &HistoryStore, id: &str) -> Result<()> {
    let record = store.load(id).await;
    if record == SessionRecord::default() {
        println!("No history for session {id}");
        return Ok(());
    }
    println!();
    println!("{}", format!("Session {id}").cyan().bold());
    print!("{}", render_record(&record));
    Ok(())
}

async fn delete(store: &HistoryStore, id: &str) -> Result<()> {
    let existed = store
        .delete(id)
        .await
        .with_context(|| format!("failed to delete session {id}"))?;
    if existed {
        println!("{} Deleted session {id}", "✓".green());
    } else {
        println!("No history for session {id}");
    }
    Ok(())
}

/// Plain-text rendering of a record: summary first, then recent entries.
fn render_record(record: &SessionRecord) -> String {
    let mut out = String::new();
    if !record.summary.trim().is_empty() {
        out.push_str("\nSummary:\n");
        for line in record.summary.lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }
    if !record.recent.is_empty() {
        out.push_str("\nRecent:\n");
        for entry in &record.recent {
            out.push_str(&format!("  [{}] {}\n", entry.role, entry.content));
            if !entry.tools.is_empty() {
                out.push_str(&format!("      tools: {}\n", entry.tools.join(", ")));
            }
        }
    }
    out.push('\n');
    out
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use toolweave_core::types::HistoryEntry;

    #[test]
    fn render_summary_and_recent() {
        let record = SessionRecord {
            summary: "user: hello\nassistant: hi".into(),
            recent: vec![
                HistoryEntry::user("fetch example.com"),
                HistoryEntry::assistant("done", vec!["fetch__fetch".into()]),
            ],
        };
        let text = render_record(&record);
        assert!(text.contains("Summary:\n  user: hello\n  assistant: hi\n"));
        assert!(text.contains("  [user] fetch example.com\n"));
        assert!(text.contains("  [assistant] done\n      tools: fetch__fetch\n"));
    }

    #[test]
    fn render_without_summary() {
        let record = SessionRecord {
            summary: String::new(),
            recent: vec![HistoryEntry::user("hi")],
        };
        assert!(!render_record(&record).contains("Summary"));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("sessions.json"), 6);
        store.append("s1", vec![HistoryEntry::user("hi")]).await.unwrap();

        delete(&store, "s1").await.unwrap();
        assert!(store.ids().await.is_empty());
        // Missing ids are not an error.
        delete(&store, "s1").await.unwrap();
    }
}
