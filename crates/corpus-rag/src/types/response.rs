//! Response types for the HTTP surface

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::document::{Document, DocumentStatus, SourceType};

/// A retrieved passage with its fused relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedPassage {
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Passage text
    pub text: String,
    /// Chunk metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// Fused score, approximately in [0, 1], higher is better
    pub score: f32,
}

/// POST /api/search response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Original query
    pub query: String,
    /// Ranked passages
    pub passages: Vec<RankedPassage>,
    /// Whether the result was served from the query cache
    pub from_cache: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Acknowledgment returned by the ingest endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAccepted {
    /// Document ID to poll
    pub document_id: Uuid,
    /// Always `pending` at acknowledgment time
    pub status: DocumentStatus,
    /// Display name
    pub name: String,
}

/// A source the ingest endpoint declined (already known content)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSource {
    pub name: String,
    pub reason: String,
    pub existing_document_id: Uuid,
}

/// POST /api/ingest response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: Vec<IngestAccepted>,
    pub skipped: Vec<SkippedSource>,
    pub errors: Vec<IngestError>,
}

/// Per-source ingest failure (acknowledgment-time only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestError {
    pub name: String,
    pub error: String,
}

/// Registry view of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    pub status: DocumentStatus,
    pub size_bytes: u64,
    pub chunk_count: u32,
    pub successful_chunk_count: u32,
    pub failure_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name.clone(),
            source_type: doc.source_type,
            status: doc.status,
            size_bytes: doc.size_bytes,
            chunk_count: doc.chunk_count,
            successful_chunk_count: doc.successful_chunk_count,
            failure_reason: doc.failure_reason.clone(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// GET /api/dlq/stats response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqStatsResponse {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
    pub resolved: u64,
    pub total: u64,
}
