//! Utility helpers — path resolution, string manipulation.

use std::path::PathBuf;

/// Get the Toolweave data directory (e.g. `~/.toolweave/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".toolweave")
}

/// Default persisted session history file (e.g. `~/.toolweave/sessions.json`).
pub fn get_history_path() -> PathBuf {
    get_data_path().join("sessions.json")
}

/// REPL input history file (e.g. `~/.toolweave/history.txt`).
pub fn get_repl_history_path() -> PathBuf {
    get_data_path().join("history.txt")
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Clip `s` to `max_chars` characters, appending a marker that records the
/// original length. Trailing whitespace of the kept head is dropped. Unicode-safe.
pub fn clip_with_marker(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{}... (truncated, original length {len})", head.trim_end())
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(rest)
    } else if path == "~" {
        home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}
