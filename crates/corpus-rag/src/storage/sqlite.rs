//! SQLite-backed reference chunk store
//!
//! Stores chunk text plus an optional embedding BLOB, serves vector queries
//! by brute-force cosine scan, and keyword queries through an FTS5 index
//! with a normalized bm25-derived relevance score.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Chunk;

use super::{cosine_similarity, cosine_to_score, ChunkStore, ScoredChunk};

/// SQLite chunk store with FTS5 keyword search
pub struct SqliteChunkStore {
    conn: Arc<Mutex<Connection>>,
    /// Capability probe result, computed once at open
    vector_available: bool,
}

impl SqliteChunkStore {
    /// Create or open the store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let mut store = Self {
            conn: Arc::new(Mutex::new(conn)),
            vector_available: false,
        };
        store.migrate()?;
        store.vector_available = store.probe_vector_support();
        tracing::info!(
            "Chunk store opened (vector storage available: {})",
            store.vector_available
        );
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
        "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                UNIQUE(document_id, chunk_index)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_id UNINDEXED,
                text
            );
        "#,
        )?;

        Ok(())
    }

    /// Capability probe: round-trip a small vector once instead of
    /// inspecting error codes on every row insert.
    fn probe_vector_support(&self) -> bool {
        let conn = self.conn.lock();
        let probe_id = format!("__probe_{}", Uuid::new_v4());
        let vector = encode_embedding(&[0.25f32, -0.5, 1.0]);

        let inserted = conn.execute(
            r#"INSERT INTO chunks (id, document_id, chunk_index, text, embedding, metadata, created_at)
               VALUES (?1, '__probe__', -1, '', ?2, '{}', ?3)"#,
            params![probe_id, vector, chrono::Utc::now()],
        );
        if inserted.is_err() {
            return false;
        }

        let readback: std::result::Result<Option<Vec<u8>>, _> = conn.query_row(
            "SELECT embedding FROM chunks WHERE id = ?1",
            params![probe_id],
            |row| row.get(0),
        );
        let _ = conn.execute("DELETE FROM chunks WHERE id = ?1", params![probe_id]);

        match readback {
            Ok(Some(bytes)) => decode_embedding(&bytes) == vec![0.25f32, -0.5, 1.0],
            _ => false,
        }
    }

    fn put_chunk_sync(&self, chunk: &Chunk) -> Result<()> {
        let embedding_blob = match &chunk.embedding {
            Some(vector) if self.vector_available => Some(encode_embedding(vector)),
            _ => None,
        };
        let metadata = serde_json::to_string(&chunk.metadata)?;

        let conn = self.conn.lock();

        // Remove a previous row at the same (document, index) slot so the
        // FTS shadow table never holds stale text for replaced chunks.
        let stale: Option<String> = conn
            .query_row(
                "SELECT id FROM chunks WHERE document_id = ?1 AND chunk_index = ?2",
                params![chunk.document_id.to_string(), chunk.index as i64],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(stale_id) = stale {
            conn.execute("DELETE FROM chunks WHERE id = ?1", params![stale_id])?;
            conn.execute("DELETE FROM chunks_fts WHERE chunk_id = ?1", params![stale_id])?;
        }

        conn.execute(
            r#"INSERT OR REPLACE INTO chunks
               (id, document_id, chunk_index, text, embedding, metadata, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                chunk.id.to_string(),
                chunk.document_id.to_string(),
                chunk.index as i64,
                chunk.text,
                embedding_blob,
                metadata,
                chrono::Utc::now(),
            ],
        )?;
        conn.execute("DELETE FROM chunks_fts WHERE chunk_id = ?1", params![chunk.id.to_string()])?;
        conn.execute(
            "INSERT INTO chunks_fts (chunk_id, text) VALUES (?1, ?2)",
            params![chunk.id.to_string(), chunk.text],
        )?;

        Ok(())
    }

    fn delete_document_sync(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute(
            r#"DELETE FROM chunks_fts WHERE chunk_id IN
               (SELECT id FROM chunks WHERE document_id = ?1)"#,
            params![document_id.to_string()],
        )?;
        let deleted = conn.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )?;
        Ok(deleted)
    }

    fn vector_search_sync(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, chunk_index, text, embedding, metadata FROM chunks
             WHERE embedding IS NOT NULL",
        )?;

        let mut results: Vec<ScoredChunk> = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(4)?;
                Ok((row_to_chunk_parts(row)?, blob))
            })?
            .filter_map(|r| r.ok())
            .map(|(chunk, blob)| {
                let stored = decode_embedding(&blob);
                let score = cosine_to_score(cosine_similarity(embedding, &stored));
                ScoredChunk { chunk, score }
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    fn keyword_search_sync(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let match_expr = fts_match_expression(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT c.id, c.document_id, c.chunk_index, c.text, NULL, c.metadata, rank
               FROM chunks_fts f
               JOIN chunks c ON c.id = f.chunk_id
               WHERE chunks_fts MATCH ?1
               ORDER BY rank
               LIMIT ?2"#,
        )?;

        let results = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                let chunk = row_to_chunk_parts(row)?;
                let rank: f64 = row.get(6)?;
                Ok(ScoredChunk {
                    chunk,
                    score: bm25_to_score(rank),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Search(format!("Keyword query failed: {}", e)))?;

        Ok(results)
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn put_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.put_chunk_sync(chunk)
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<usize> {
        self.delete_document_sync(document_id)
    }

    async fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        self.vector_search_sync(embedding, limit)
    }

    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        self.keyword_search_sync(query, limit)
    }

    fn supports_vectors(&self) -> bool {
        self.vector_available
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Encode an embedding as little-endian f32 bytes
fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into an embedding
fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Build a safe FTS5 MATCH expression: quoted alphanumeric terms OR-ed for recall
fn fts_match_expression(query: &str) -> String {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    terms.join(" OR ")
}

/// Normalize an FTS5 bm25 rank (more negative = more relevant) into (0, 1)
fn bm25_to_score(rank: f64) -> f32 {
    let strength = rank.abs();
    (strength / (1.0 + strength)) as f32
}

fn row_to_chunk_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let id: String = row.get(0)?;
    let document_id: String = row.get(1)?;
    let index: i64 = row.get(2)?;
    let metadata: String = row.get(5)?;

    Ok(Chunk {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        document_id: Uuid::parse_str(&document_id).unwrap_or_default(),
        index: index.max(0) as u32,
        text: row.get(3)?,
        embedding: None,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with(doc: Uuid, index: u32, text: &str, embedding: Option<Vec<f32>>) -> Chunk {
        let mut chunk = Chunk::new(doc, index, text.to_string());
        chunk.embedding = embedding;
        chunk
    }

    #[tokio::test]
    async fn probe_reports_vector_support() {
        let store = SqliteChunkStore::in_memory().unwrap();
        assert!(store.supports_vectors());
    }

    #[tokio::test]
    async fn vector_search_ranks_by_cosine() {
        let store = SqliteChunkStore::in_memory().unwrap();
        let doc = Uuid::new_v4();

        store
            .put_chunk(&chunk_with(doc, 0, "north", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store
            .put_chunk(&chunk_with(doc, 1, "east", Some(vec![0.0, 1.0])))
            .await
            .unwrap();
        store
            .put_chunk(&chunk_with(doc, 2, "keyword only", None))
            .await
            .unwrap();

        let results = store.vector_search(&[1.0, 0.0], 10).await.unwrap();
        // The unembedded chunk never appears in vector results
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "north");
        assert!(results[0].score > results[1].score);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn keyword_search_finds_unembedded_chunks() {
        let store = SqliteChunkStore::in_memory().unwrap();
        let doc = Uuid::new_v4();

        store
            .put_chunk(&chunk_with(doc, 0, "the reactor manual", None))
            .await
            .unwrap();
        store
            .put_chunk(&chunk_with(doc, 1, "unrelated gardening tips", None))
            .await
            .unwrap();

        let results = store.keyword_search("reactor", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "the reactor manual");
        assert!(results[0].score > 0.0 && results[0].score <= 1.0);
    }

    #[tokio::test]
    async fn keyword_search_survives_hostile_input() {
        let store = SqliteChunkStore::in_memory().unwrap();
        let doc = Uuid::new_v4();
        store
            .put_chunk(&chunk_with(doc, 0, "plain text", None))
            .await
            .unwrap();

        // FTS5 operators and quotes must not produce a syntax error
        assert!(store.keyword_search("\"AND OR NOT (", 10).await.is_ok());
        assert!(store.keyword_search("***", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_document_cascades_and_clears_fts() {
        let store = SqliteChunkStore::in_memory().unwrap();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();

        store
            .put_chunk(&chunk_with(doc_a, 0, "alpha content", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store
            .put_chunk(&chunk_with(doc_a, 1, "beta content", None))
            .await
            .unwrap();
        store
            .put_chunk(&chunk_with(doc_b, 0, "gamma content", None))
            .await
            .unwrap();

        assert_eq!(store.delete_document(doc_a).await.unwrap(), 2);
        assert!(store.keyword_search("alpha", 10).await.unwrap().is_empty());
        assert_eq!(store.keyword_search("gamma", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reingest_overwrites_same_index_slot() {
        let store = SqliteChunkStore::in_memory().unwrap();
        let doc = Uuid::new_v4();

        store
            .put_chunk(&chunk_with(doc, 0, "old text", None))
            .await
            .unwrap();
        store
            .put_chunk(&chunk_with(doc, 0, "new text", None))
            .await
            .unwrap();

        assert!(store.keyword_search("old", 10).await.unwrap().is_empty());
        assert_eq!(store.keyword_search("new", 10).await.unwrap().len(), 1);
    }

    #[test]
    fn embedding_blob_roundtrip() {
        let vector = vec![0.1f32, -2.5, 3.75];
        assert_eq!(decode_embedding(&encode_embedding(&vector)), vector);
    }
}
