use crate::state::AppState;
use axum::Router;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;
    let app = create_app(state);

    tracing::info!("🌐 Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    crate::web::routes::create_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(crate::web::middleware::cors_layer())
}
