//! Document registry endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::DocumentSummary;

/// GET /api/documents - list all documents
pub async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<DocumentSummary>>> {
    let docs = state.registry().list_documents()?;
    Ok(Json(docs.iter().map(DocumentSummary::from).collect()))
}

/// GET /api/documents/:id - current status and counters
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentSummary>> {
    let doc = state
        .registry()
        .get_document(id)?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
    Ok(Json(DocumentSummary::from(&doc)))
}

/// DELETE /api/documents/:id - remove a document and cascade to its chunks
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    if state.registry().get_document(id)?.is_none() {
        return Err(Error::DocumentNotFound(id.to_string()));
    }

    let deleted_chunks = state.store().delete_document(id).await?;
    state.registry().delete_document(id)?;
    // Cached query results may cite the deleted chunks
    state.retriever().invalidate_cache();

    tracing::info!("Deleted document {} ({} chunks)", id, deleted_chunks);

    Ok(Json(json!({
        "document_id": id,
        "deleted_chunks": deleted_chunks,
    })))
}
