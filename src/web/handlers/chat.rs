//! Chat endpoints: buffered send, SSE streaming send, and model status.

use crate::services::{assembler, fallback, postprocess, relay};
use crate::state::AppState;
use crate::types::events::StreamEvent;
use crate::types::message::CompletionRequest;
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;

/// Hard bound on the user message, matching the product's validation rule.
pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: String,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub conversation_history: Vec<Value>,
}

/// Query-string form of the streaming request: EventSource clients can only
/// issue GETs, so the history arrives as a JSON-encoded string.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub message: String,
    pub temperature: Option<f32>,
    pub conversation_history: Option<String>,
}

/// Handle a buffered chat turn: assemble, forward, post-process.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Response {
    if let Err(rejection) = validate_message(&req.message) {
        return rejection;
    }
    let temperature = clamp_temperature(req.temperature, state.config.temperature_default);
    tracing::info!(
        "buffered chat turn, {} history entries, temperature {}",
        req.conversation_history.len(),
        temperature
    );

    let request = CompletionRequest {
        model: state.config.model_name.clone(),
        messages: assembler::assemble(
            &req.message,
            &req.conversation_history,
            state.config.history_limit,
        ),
        temperature,
        max_tokens: state.config.max_tokens,
        stream: false,
    };

    match state.upstream.send_buffered(&request).await {
        Ok(result) => {
            let processed = postprocess::process(&result.content);
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "response": processed.final_answer,
                    "thinking_process": processed.thinking,
                    "model_used": state.config.model_name,
                    "tokens_used": result.usage,
                })),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("buffered completion failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Failed to connect to AI model",
                    "details": err.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// GET variant of the streaming endpoint (EventSource).
pub async fn send_stream_query(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    // Malformed history is tolerated, never rejected.
    let history = query
        .conversation_history
        .as_deref()
        .and_then(|raw| serde_json::from_str::<Vec<Value>>(raw).ok())
        .unwrap_or_default();
    send_stream(state, query.message, query.temperature, history).await
}

/// POST variant of the streaming endpoint.
pub async fn send_stream_json(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Response {
    send_stream(state, req.message, req.temperature, req.conversation_history).await
}

/// Probe-then-commit: a quick `/v1/models` probe decides between the real
/// upstream stream (long timeout) and the locally synthesized fallback.
/// Either way the client sees the same delta protocol ending in `[DONE]`.
async fn send_stream(
    state: AppState,
    message: String,
    temperature: Option<f32>,
    history: Vec<Value>,
) -> Response {
    if let Err(rejection) = validate_message(&message) {
        return rejection;
    }
    let temperature = clamp_temperature(temperature, state.config.temperature_default);

    let request = CompletionRequest {
        model: state.config.model_name.clone(),
        messages: assembler::assemble(&message, &history, state.config.history_limit),
        temperature,
        max_tokens: state.config.max_tokens,
        stream: true,
    };

    let events: BoxStream<'static, StreamEvent> = match state.upstream.probe().await {
        Ok(_) => match state.upstream.send_streaming(&request).await {
            Ok(bytes) => relay::relay(bytes).boxed(),
            Err(err) => {
                tracing::error!("streaming request failed after successful probe: {}", err);
                futures::stream::iter([StreamEvent::error(err.to_string()), StreamEvent::Done])
                    .boxed()
            }
        },
        Err(err) => {
            tracing::warn!("upstream probe failed, serving fallback reply: {}", err);
            let reply = fallback::pick_reply(&message).to_string();
            fallback::fallback_stream(reply, state.config.fallback_word_delay()).boxed()
        }
    };

    sse_response(events)
}

/// Report whether the inference server is reachable and which models it
/// advertises.
pub async fn model_status(State(state): State<AppState>) -> Response {
    match state.upstream.probe().await {
        Ok(models) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "status": "connected",
                "models": models,
            })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "status": "disconnected",
                "error": err.to_string(),
            })),
        )
            .into_response(),
    }
}

/// Wrap an event stream as an SSE response. The leading comment tells the
/// client the connection is live before the first upstream byte arrives;
/// each event is flushed as soon as it is yielded. Buffering and caching by
/// intermediaries are disabled so deltas reach the browser immediately.
fn sse_response(events: BoxStream<'static, StreamEvent>) -> Response {
    let stream = futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().comment("connecting"))
    })
    .chain(events.map(|event| Ok(Event::default().data(event.to_sse_data()))));

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response()
}

fn validate_message(message: &str) -> Result<(), Response> {
    let reason = if message.trim().is_empty() {
        Some("message is required")
    } else if message.chars().count() > MAX_MESSAGE_CHARS {
        Some("message exceeds the 1000 character limit")
    } else {
        None
    };

    match reason {
        None => Ok(()),
        Some(details) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "Invalid request",
                "details": details,
            })),
        )
            .into_response()),
    }
}

fn clamp_temperature(temperature: Option<f32>, default: f32) -> f32 {
    // Query strings can smuggle in NaN or infinity, which would survive
    // `clamp` and serialize as JSON null upstream.
    match temperature {
        Some(t) if t.is_finite() => t.clamp(0.0, 1.0),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_validation() {
        assert!(validate_message("hello").is_ok());
        assert!(validate_message("").is_err());
        assert!(validate_message("   ").is_err());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn test_temperature_clamping() {
        assert_eq!(clamp_temperature(None, 0.7), 0.7);
        assert_eq!(clamp_temperature(Some(0.3), 0.7), 0.3);
        assert_eq!(clamp_temperature(Some(1.8), 0.7), 1.0);
        assert_eq!(clamp_temperature(Some(-0.5), 0.7), 0.0);
        assert_eq!(clamp_temperature(Some(f32::NAN), 0.7), 0.7);
        assert_eq!(clamp_temperature(Some(f32::INFINITY), 0.7), 0.7);
    }
}
