//! HTTP route definitions

pub mod dlq;
pub mod documents;
pub mod ingest;
pub mod search;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use super::state::AppState;

/// Build the API router
pub fn router(state: AppState) -> Router {
    let max_upload = state.config().server.max_upload_size;
    let enable_cors = state.config().server.enable_cors;

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/ingest", post(ingest::ingest_files))
        .route("/api/crawl", post(ingest::crawl_url))
        .route("/api/documents", get(documents::list_documents))
        .route("/api/documents/:id", get(documents::get_document))
        .route("/api/documents/:id", delete(documents::delete_document))
        .route("/api/search", post(search::search))
        .route("/api/answer", post(search::answer))
        .route("/api/dlq/stats", get(dlq::dlq_stats))
        .layer(DefaultBodyLimit::max(max_upload))
        .with_state(state);

    if enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// GET /health - liveness plus store capabilities
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let documents = state.registry().list_documents().map(|d| d.len()).unwrap_or(0);
    Json(json!({
        "status": "ok",
        "vector_storage": state.store().supports_vectors(),
        "documents": documents,
        "queue_depth": state.queue().depth(),
    }))
}
