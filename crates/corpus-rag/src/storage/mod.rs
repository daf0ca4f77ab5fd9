//! Storage collaborator contract and reference implementations
//!
//! The engine delegates the vector index and full-text index to the
//! underlying store; this module only defines the contract plus two
//! reference implementations (SQLite-backed and in-memory).

pub mod memory;
pub mod registry;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::Chunk;

pub use memory::MemoryChunkStore;
pub use registry::RegistryDb;
pub use sqlite::SqliteChunkStore;

/// A chunk with a retrieval score in [0, 1], higher is better
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The retrieved chunk (embedding omitted)
    pub chunk: Chunk,
    /// Branch-local relevance score
    pub score: f32,
}

/// Contract for the underlying chunk store
///
/// `supports_vectors` is a capability probe performed once at construction
/// and cached; the pipeline consults it instead of branching on per-row
/// storage errors.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Upsert a chunk (embedding optional); racing writers on the same id are harmless
    async fn put_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Delete all chunks of a document, returning how many were removed
    async fn delete_document(&self, document_id: Uuid) -> Result<usize>;

    /// Approximate-nearest-neighbor query; scores are cosine-derived in [0, 1]
    async fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Lexical query over chunk text
    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Whether embedding vectors can be stored and queried
    fn supports_vectors(&self) -> bool;

    /// Store name for diagnostics
    fn name(&self) -> &str;
}

/// Map a cosine similarity in [-1, 1] to a score in [0, 1]
pub(crate) fn cosine_to_score(cosine: f32) -> f32 {
    ((1.0 + cosine) / 2.0).clamp(0.0, 1.0)
}

/// Cosine similarity of two vectors; 0.0 when lengths differ or norms vanish
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
