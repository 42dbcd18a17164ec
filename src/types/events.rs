use serde_json::json;

/// Normalized events produced by the stream relay (or the fallback
/// responder) and consumed by the SSE transport. Exactly one `Done`
/// terminates every session; nothing is emitted after it.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ContentDelta { text: String },
    Done,
    Error { message: String },
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::ContentDelta { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Payload of the `data:` field sent to the browser. Deltas are JSON
    /// objects the client reads `content` from; the terminator is the
    /// literal `[DONE]` sentinel EventSource clients watch for.
    pub fn to_sse_data(&self) -> String {
        match self {
            Self::ContentDelta { text } => json!({ "content": text }).to_string(),
            Self::Done => "[DONE]".to_string(),
            Self::Error { message } => json!({ "error": message }).to_string(),
        }
    }
}
