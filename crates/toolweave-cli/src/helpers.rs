//! Shared CLI helpers — turn execution with Ctrl-C, output formatting, banner.

use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use toolweave_agent::{SessionHandle, TurnOutcome};

/// Run one turn; Ctrl-C while it runs cancels the turn instead of the process.
pub async fn run_turn(handle: &SessionHandle, input: &str) -> TurnOutcome {
    let cancel = CancellationToken::new();
    let turn = handle.turn(input, cancel.clone());
    tokio::pin!(turn);

    tokio::select! {
        outcome = &mut turn => outcome,
        _ = tokio::signal::ctrl_c() => {
            debug!(session = handle.id(), "Ctrl-C, cancelling turn");
            cancel.cancel();
            turn.await
        }
    }
}

/// Stream one turn to stdout as it is generated; Ctrl-C stops it.
pub async fn run_stream_turn(handle: &SessionHandle, input: &str) -> TurnOutcome {
    let cancel = CancellationToken::new();
    println!();
    println!("{}", "Toolweave".cyan().bold());

    let mut printed = false;
    let outcome = {
        let turn = handle.stream_turn(input, cancel.clone(), |piece| {
            printed = true;
            print!("{piece}");
            let _ = std::io::stdout().flush();
        });
        tokio::pin!(turn);

        tokio::select! {
            outcome = &mut turn => outcome,
            _ = tokio::signal::ctrl_c() => {
                debug!(session = handle.id(), "Ctrl-C, stopping stream");
                cancel.cancel();
                turn.await
            }
        }
    };

    // Errors and empty cancellations never reached the stream.
    if !printed {
        print!("{}", outcome.content);
    }
    println!();
    println!();
    outcome
}

/// Replace the home directory prefix with `~` for display.
pub fn display_path(path: &Path) -> String {
    tilde_path(path, dirs_next::home_dir()).display().to_string()
}

fn tilde_path(path: &Path, home: Option<PathBuf>) -> PathBuf {
    match home.as_deref().and_then(|h| path.strip_prefix(h).ok()) {
        Some(rest) => Path::new("~").join(rest),
        None => path.to_path_buf(),
    }
}

/// `a, b, c` with each distinct tool listed once, in first-use order.
pub fn format_tools_used(tools: &[String]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for tool in tools {
        if !seen.contains(&tool.as_str()) {
            seen.push(tool.as_str());
        }
    }
    seen.join(", ")
}

/// Print a turn's answer and the tools it used.
pub fn print_outcome(outcome: &TurnOutcome) {
    println!();
    println!("{}", "Toolweave".cyan().bold());
    if outcome.content.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", outcome.content);
    }
    if !outcome.tools.is_empty() {
        println!(
            "{} {}",
            "tools:".dimmed(),
            format_tools_used(&outcome.tools).dimmed()
        );
    }
    println!();
}

/// Tell the user how to continue a single-shot session.
pub fn print_session_hint(session_id: &str) {
    println!(
        "{}",
        format!("session: {session_id} (resume with -s {session_id})").dimmed()
    );
}

/// Print the banner shown at REPL start.
pub fn print_banner(session_id: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Toolweave".cyan().bold(), version.dimmed());
    println!("{}", format!("session {session_id}").dimmed());
    println!(
        "{}",
        "Type a message, or \"exit\" to quit. Ctrl-C cancels a running turn.".dimmed()
    );
    println!();
}

/// Print a "thinking" placeholder.
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
