//! Document and chunk types with ingestion status tracking

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Where a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Uploaded file
    File,
    /// Crawled web page
    WebCrawl,
}

/// Ingestion status of a document
///
/// Transitions are strictly forward:
/// `Pending -> Processing -> Vectorizing -> {Completed | Partial | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Record created, no work started
    Pending,
    /// Raw content is being fetched/extracted
    Processing,
    /// Text chunked; embeddings being computed and chunks persisted
    Vectorizing,
    /// Every chunk was embedded and stored
    Completed,
    /// Some, but not all, chunks were embedded and stored
    Partial,
    /// Zero chunks stored, or extraction produced no usable text
    Failed,
}

impl DocumentStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }

    /// Whether a transition to `to` is allowed (never backward)
    pub fn can_transition(&self, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match (self, to) {
            (Pending, Processing) => true,
            (Processing, Vectorizing) => true,
            (Vectorizing, Completed) | (Vectorizing, Partial) | (Vectorizing, Failed) => true,
            // Fail-safe: any non-terminal state may be forced to Failed
            (Pending, Failed) | (Processing, Failed) => true,
            _ => false,
        }
    }

    /// Stable string form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Vectorizing => "vectorizing",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "vectorizing" => Some(Self::Vectorizing),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl SourceType {
    /// Stable string form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::WebCrawl => "web_crawl",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "web_crawl" => Some(Self::WebCrawl),
            _ => None,
        }
    }
}

/// A document registered for ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Display name (filename or URL)
    pub name: String,
    /// Source type
    pub source_type: SourceType,
    /// Ingestion status
    pub status: DocumentStatus,
    /// Raw content size in bytes
    pub size_bytes: u64,
    /// Content hash for deduplication
    pub content_hash: String,
    /// Total chunks produced by the chunker
    pub chunk_count: u32,
    /// Chunks that were embedded and stored
    pub successful_chunk_count: u32,
    /// Human-readable reason on Partial/Failed
    pub failure_reason: Option<String>,
    /// Creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last status update
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a new document in `Pending`
    pub fn new(name: String, source_type: SourceType, content_hash: String, size_bytes: u64) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            source_type,
            status: DocumentStatus::Pending,
            size_bytes,
            content_hash,
            chunk_count: 0,
            successful_chunk_count: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A bounded passage of text, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// 0-based position within the document, contiguous
    pub index: u32,
    /// Text content
    pub text: String,
    /// Embedding vector; absent chunks are keyword-searchable only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
    /// Opaque metadata bag (source name, page count, crawl URL, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Create a new chunk without an embedding
    pub fn new(document_id: Uuid, index: u32, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            index,
            text,
            embedding: None,
            metadata: HashMap::new(),
        }
    }
}
