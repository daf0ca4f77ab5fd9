//! In-memory chunk store for tests and embedded use

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::types::Chunk;

use super::{cosine_similarity, cosine_to_score, ChunkStore, ScoredChunk};

/// In-memory reference implementation of the store contract
///
/// Vector queries are a brute-force cosine scan; keyword queries score by
/// query-term overlap. Suitable for tests and small embedded corpora.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<Uuid, Chunk>>,
}

impl MemoryChunkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut chunks = self.chunks.write();
        // Upsert by (document, index): a re-ingested chunk replaces its slot
        chunks.retain(|_, existing| {
            !(existing.document_id == chunk.document_id && existing.index == chunk.index)
        });
        chunks.insert(chunk.id, chunk.clone());
        Ok(())
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<usize> {
        let mut chunks = self.chunks.write();
        let before = chunks.len();
        chunks.retain(|_, chunk| chunk.document_id != document_id);
        Ok(before - chunks.len())
    }

    async fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let chunks = self.chunks.read();
        let mut results: Vec<ScoredChunk> = chunks
            .values()
            .filter_map(|chunk| {
                let stored = chunk.embedding.as_ref()?;
                let score = cosine_to_score(cosine_similarity(embedding, stored));
                let mut chunk = chunk.clone();
                chunk.embedding = None;
                Some(ScoredChunk { chunk, score })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read();
        let mut results: Vec<ScoredChunk> = chunks
            .values()
            .filter_map(|chunk| {
                let haystack = chunk.text.to_lowercase();
                let hits = terms.iter().filter(|t| haystack.contains(*t)).count();
                if hits == 0 {
                    return None;
                }
                let mut chunk = chunk.clone();
                chunk.embedding = None;
                Some(ScoredChunk {
                    chunk,
                    score: hits as f32 / terms.len() as f32,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    fn supports_vectors(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }
}
