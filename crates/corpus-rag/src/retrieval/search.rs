//! Hybrid retrieval: parallel vector + keyword fan-out, fusion, re-ranking
//!
//! A search never raises to its caller: branch failures degrade to the
//! surviving branch, and total failure yields an empty result list.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::storage::{ChunkStore, ScoredChunk};
use crate::types::RankedPassage;

use super::fusion::{fuse, FusionWeights};
use super::query_cache::QueryCache;
use super::rerank::RerankProvider;

/// Hybrid retriever over the chunk store and embedding client
pub struct HybridRetriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<EmbeddingClient>,
    reranker: Option<Arc<dyn RerankProvider>>,
    cache: QueryCache,
    weights: FusionWeights,
    keyword_confidence: f32,
    branch_timeout: Duration,
    rerank_top_n: usize,
}

impl HybridRetriever {
    /// Create a new retriever
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<EmbeddingClient>,
        reranker: Option<Arc<dyn RerankProvider>>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            cache: QueryCache::new(config.cache_max_entries, config.cache_ttl_secs),
            weights: FusionWeights {
                vector: config.vector_weight,
                keyword: config.keyword_weight,
            },
            keyword_confidence: config.keyword_confidence,
            branch_timeout: Duration::from_millis(config.branch_timeout_ms),
            rerank_top_n: config.rerank_top_n,
        }
    }

    /// Search for the `top_k` most relevant passages.
    ///
    /// Returns the ranked passages and whether they came from the query
    /// cache. Empty or whitespace queries return an empty result without
    /// touching either search branch.
    pub async fn search(&self, query: &str, top_k: usize) -> (Vec<RankedPassage>, bool) {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return (Vec::new(), false);
        }

        if let Some(cached) = self.cache.get(query, top_k) {
            return (cached, true);
        }

        // Over-fetch so fusion can re-prioritize across branches
        let fetch = top_k * 2;

        let vector_branch = async {
            let vector = match self.embedder.embed(query).await {
                Ok(Some(vector)) => vector,
                Ok(None) => {
                    tracing::warn!("Query could not be embedded, degrading to keyword-only");
                    return Ok(Vec::new());
                }
                Err(e) => {
                    tracing::warn!("Query embedding failed, degrading to keyword-only: {}", e);
                    return Ok(Vec::new());
                }
            };
            self.store.vector_search(&vector, fetch).await
        };
        let keyword_branch = self.store.keyword_search(query, fetch);

        let (vector_out, keyword_out) = tokio::join!(
            timeout(self.branch_timeout, vector_branch),
            timeout(self.branch_timeout, keyword_branch),
        );

        let vector_results = settle_branch("vector", vector_out);
        let mut keyword_results = settle_branch("keyword", keyword_out);

        // Engines that cannot rank report a non-positive score; substitute
        // the configured fixed confidence so fusion stays comparable.
        for result in &mut keyword_results {
            if !result.score.is_finite() || result.score <= 0.0 {
                result.score = self.keyword_confidence;
            }
        }

        let mut ranked = fuse(vector_results, keyword_results, self.weights);
        ranked.truncate(top_k);

        self.apply_rerank(query, &mut ranked).await;

        let passages: Vec<RankedPassage> = ranked
            .into_iter()
            .map(|result| RankedPassage {
                chunk_id: result.chunk.id,
                document_id: result.chunk.document_id,
                text: result.chunk.text,
                metadata: result.chunk.metadata,
                score: result.score,
            })
            .collect();

        self.cache.put(query, top_k, passages.clone());
        (passages, false)
    }

    /// Best-effort second pass: average the cross-encoder score into the
    /// fused score and re-sort. Any re-ranker failure leaves the fused
    /// order untouched.
    async fn apply_rerank(&self, query: &str, ranked: &mut Vec<ScoredChunk>) {
        let Some(reranker) = &self.reranker else {
            return;
        };
        let n = self.rerank_top_n.min(ranked.len());
        if n == 0 {
            return;
        }

        let scores = join_all(
            ranked[..n]
                .iter()
                .map(|result| reranker.score(query, &result.chunk.text)),
        )
        .await;

        let mut collected = Vec::with_capacity(n);
        for score in scores {
            match score {
                Ok(value) => collected.push(value),
                Err(e) => {
                    tracing::warn!("Re-ranker failed, keeping fused order: {}", e);
                    return;
                }
            }
        }

        for (result, rerank_score) in ranked[..n].iter_mut().zip(collected) {
            result.score = (result.score + rerank_score) / 2.0;
        }
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Drop all cached query results (e.g. after a document deletion)
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

fn settle_branch(
    name: &str,
    outcome: std::result::Result<Result<Vec<ScoredChunk>>, tokio::time::error::Elapsed>,
) -> Vec<ScoredChunk> {
    match outcome {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            tracing::warn!("{} branch failed, degrading to the other branch: {}", name, e);
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("{} branch timed out, degrading to the other branch", name);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, RetryConfig};
    use crate::embedding::EmbeddingProvider;
    use crate::error::Error;
    use crate::retry::RetryPolicy;
    use crate::storage::MemoryChunkStore;
    use crate::types::Chunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Deterministic 2-d provider: "north"-ish texts embed along x, others along y
    struct AxisProvider;

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("north") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }

        fn model(&self) -> &str {
            "axis"
        }

        fn name(&self) -> &str {
            "axis"
        }
    }

    /// Store wrapper that counts branch invocations
    struct CountingStore {
        inner: MemoryChunkStore,
        vector_calls: AtomicUsize,
        keyword_calls: AtomicUsize,
        fail_vector: bool,
    }

    impl CountingStore {
        fn new(fail_vector: bool) -> Self {
            Self {
                inner: MemoryChunkStore::new(),
                vector_calls: AtomicUsize::new(0),
                keyword_calls: AtomicUsize::new(0),
                fail_vector,
            }
        }
    }

    #[async_trait]
    impl ChunkStore for CountingStore {
        async fn put_chunk(&self, chunk: &Chunk) -> Result<()> {
            self.inner.put_chunk(chunk).await
        }

        async fn delete_document(&self, document_id: Uuid) -> Result<usize> {
            self.inner.delete_document(document_id).await
        }

        async fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
            self.vector_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_vector {
                return Err(Error::Search("vector index offline".to_string()));
            }
            self.inner.vector_search(embedding, limit).await
        }

        async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
            self.keyword_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.keyword_search(query, limit).await
        }

        fn supports_vectors(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn embedder() -> Arc<EmbeddingClient> {
        let config = EmbeddingConfig {
            dimensions: 2,
            ..Default::default()
        };
        let retry = RetryPolicy::new(&RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
            jitter: false,
        });
        Arc::new(EmbeddingClient::new(Arc::new(AxisProvider), retry, &config))
    }

    async fn seed(store: &dyn ChunkStore) {
        let doc = Uuid::new_v4();
        let mut north = Chunk::new(doc, 0, "facts about the north pole".to_string());
        north.embedding = Some(vec![1.0, 0.0]);
        store.put_chunk(&north).await.unwrap();

        let mut south = Chunk::new(doc, 1, "notes on southern gardens".to_string());
        south.embedding = Some(vec![0.0, 1.0]);
        store.put_chunk(&south).await.unwrap();
    }

    fn retriever(store: Arc<dyn ChunkStore>, reranker: Option<Arc<dyn RerankProvider>>) -> HybridRetriever {
        HybridRetriever::new(store, embedder(), reranker, &RetrievalConfig::default())
    }

    #[tokio::test]
    async fn empty_query_skips_both_branches() {
        let store = Arc::new(CountingStore::new(false));
        let retriever = retriever(store.clone(), None);

        let (passages, from_cache) = retriever.search("", 5).await;
        assert!(passages.is_empty());
        assert!(!from_cache);

        let (passages, _) = retriever.search("   \t ", 5).await;
        assert!(passages.is_empty());

        assert_eq!(store.vector_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.keyword_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hybrid_search_ranks_agreeing_chunk_first() {
        let store = Arc::new(CountingStore::new(false));
        seed(store.as_ref()).await;
        let retriever = retriever(store, None);

        // "north" matches chunk 0 by vector and by keyword
        let (passages, from_cache) = retriever.search("north pole", 2).await;
        assert!(!from_cache);
        assert_eq!(passages.len(), 2);
        assert!(passages[0].text.contains("north"));
        assert!(passages[0].score > passages[1].score);
    }

    #[tokio::test]
    async fn vector_branch_failure_degrades_to_keyword() {
        let store = Arc::new(CountingStore::new(true));
        seed(store.as_ref()).await;
        let retriever = retriever(store.clone(), None);

        let (passages, _) = retriever.search("gardens", 5).await;
        assert_eq!(passages.len(), 1);
        assert!(passages[0].text.contains("gardens"));
        assert_eq!(store.vector_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn both_branches_empty_yields_empty_not_error() {
        let store = Arc::new(CountingStore::new(true));
        let retriever = retriever(store, None);

        let (passages, _) = retriever.search("anything at all", 5).await;
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let store = Arc::new(CountingStore::new(false));
        seed(store.as_ref()).await;
        let retriever = retriever(store.clone(), None);

        let (first, from_cache) = retriever.search("north", 2).await;
        assert!(!from_cache);
        let (second, from_cache) = retriever.search("north", 2).await;
        assert!(from_cache);
        assert_eq!(first.len(), second.len());
        assert_eq!(store.keyword_calls.load(Ordering::SeqCst), 1);
    }

    struct FixedReranker {
        fail: bool,
    }

    #[async_trait]
    impl RerankProvider for FixedReranker {
        async fn score(&self, _query: &str, passage: &str) -> Result<f32> {
            if self.fail {
                return Err(Error::Rerank("cross-encoder offline".to_string()));
            }
            // Invert the fused preference: the "southern" chunk wins
            if passage.contains("southern") {
                Ok(1.0)
            } else {
                Ok(0.0)
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn reranker_averages_and_reorders() {
        let store = Arc::new(CountingStore::new(false));
        seed(store.as_ref()).await;
        let retriever = retriever(store, Some(Arc::new(FixedReranker { fail: false })));

        let (passages, _) = retriever.search("north", 2).await;
        assert_eq!(passages.len(), 2);
        // A strong rerank score lifts the southern chunk over the fused winner
        assert!(passages[0].text.contains("southern"));
    }

    #[tokio::test]
    async fn reranker_failure_falls_back_to_fused_order() {
        let store = Arc::new(CountingStore::new(false));
        seed(store.as_ref()).await;
        let retriever = retriever(store, Some(Arc::new(FixedReranker { fail: true })));

        let (passages, _) = retriever.search("north", 2).await;
        assert_eq!(passages.len(), 2);
        assert!(passages[0].text.contains("north"));
    }
}
