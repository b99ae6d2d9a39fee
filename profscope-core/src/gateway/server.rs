//! Router assembly and the serve loop.

use super::SharedState;
use super::routes;
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the axum router with every API route and `/health`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/chat", post(routes::chat))
        .route("/api/predict", post(routes::predict))
        .route("/api/uploadreview", post(routes::upload_reviews))
        .route("/api/reindex", post(routes::reindex))
        .route("/api/train", post(routes::train))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "reviews": state.corpus.len(),
        "vector_search": state.features.vector_search,
        "generation": state.features.generation,
        "uptime_secs": state.uptime_secs(),
    }))
}

/// Serve on `host:port` until cancelled.
pub async fn run(state: SharedState, host: &str, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
