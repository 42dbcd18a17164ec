use tower_http::cors::{Any, CorsLayer};

/// The browser client may be served from a different origin than the relay.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
