//! Server-sent-event framing for streamed chat completions.
//!
//! Bytes arrive in arbitrary chunks; only complete `\n`-terminated lines are
//! decoded, so multi-byte characters split across chunks survive.

use toolweave_core::types::ChatCompletionChunk;
use tracing::debug;

/// One meaningful event from the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// A piece of assistant text.
    Delta(String),
    /// The `data: [DONE]` terminator.
    Done,
}

/// Accumulates raw bytes and yields events line by line.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    /// Feed a chunk; returns the events of every line it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }
}

/// Decode one SSE line. Comments, other fields and unparseable payloads are
/// skipped.
pub fn parse_line(line: &str) -> Option<SseEvent> {
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk.into_text().map(SseEvent::Delta),
        Err(e) => {
            debug!(error = %e, "skipping undecodable stream chunk");
            None
        }
    }
}
