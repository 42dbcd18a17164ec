//! Builds the ordered message list forwarded to the inference server.

use crate::types::message::{ChatMessage, Role};
use serde_json::Value;

/// Fixed system prompt prepended to every turn.
pub const SYSTEM_PROMPT: &str = "You are OnlineCareAI, a helpful healthcare assistant. \
    Provide accurate, helpful, and caring responses about health and medical topics. \
    Always recommend consulting healthcare professionals for serious medical concerns.";

/// Assemble the payload for one chat turn: system prompt first, then each
/// valid history entry in its original order (bounded to the most recent
/// `history_limit`), then the new user message last.
///
/// History arrives as loose JSON from the client; entries missing `role` or
/// `content` (or carrying an unknown role) are skipped, never an error.
pub fn assemble(message: &str, history: &[Value], history_limit: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];

    for entry in truncate_history(history, history_limit) {
        if let Some(parsed) = parse_history_entry(entry) {
            messages.push(parsed);
        } else {
            tracing::debug!("skipping malformed history entry: {}", entry);
        }
    }

    messages.push(ChatMessage::user(message));
    messages
}

/// Keep only the most recent `limit` entries, preserving relative order.
/// Idempotent by construction.
pub fn truncate_history(history: &[Value], limit: usize) -> &[Value] {
    let start = history.len().saturating_sub(limit);
    &history[start..]
}

fn parse_history_entry(entry: &Value) -> Option<ChatMessage> {
    let role = Role::parse(entry.get("role")?.as_str()?)?;
    let content = entry.get("content")?.as_str()?;
    Some(ChatMessage {
        role,
        content: content.to_string(),
    })
}
