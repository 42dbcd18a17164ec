use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // Chat API
        .route("/api/chat/send", post(super::handlers::chat::send_message))
        .route(
            "/api/chat/send-stream",
            get(super::handlers::chat::send_stream_query)
                .post(super::handlers::chat::send_stream_json),
        )
        .route(
            "/api/chat/model-status",
            get(super::handlers::chat::model_status),
        )
        // Health check
        .route("/health", get(super::handlers::health::health_check))
        .with_state(state)
}
