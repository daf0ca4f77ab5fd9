//! Ingestion pipeline: drives one document through the status machine
//!
//! `Pending -> Processing -> Vectorizing -> {Completed | Partial | Failed}`.
//! Extraction failures are fatal to the document and not retried; embedding
//! failures degrade the affected chunk to keyword-only storage and record it
//! in the dead letter queue for later re-embedding.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunking::{add_metadata, Chunker};
use crate::dlq::{DeadLetterQueue, DlqItemType};
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::storage::{ChunkStore, RegistryDb};
use crate::types::{Chunk, DocumentStatus, SourceType};

use super::extract::{RawSource, TextExtractor};

/// Ingestion pipeline over the registry, store, and embedding client
pub struct IngestionPipeline {
    registry: Arc<RegistryDb>,
    store: Arc<dyn ChunkStore>,
    embedder: Arc<EmbeddingClient>,
    extractor: Arc<dyn TextExtractor>,
    dlq: Arc<DeadLetterQueue>,
    chunker: Chunker,
    parallel_embeddings: usize,
}

impl IngestionPipeline {
    /// Create a new pipeline
    pub fn new(
        registry: Arc<RegistryDb>,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<EmbeddingClient>,
        extractor: Arc<dyn TextExtractor>,
        dlq: Arc<DeadLetterQueue>,
        chunker: Chunker,
        parallel_embeddings: usize,
    ) -> Self {
        Self {
            registry,
            store,
            embedder,
            extractor,
            dlq,
            chunker,
            parallel_embeddings: parallel_embeddings.max(1),
        }
    }

    /// Ingest one document. Never returns an error: every outcome lands in
    /// the document's status field, with unexpected errors forcing `Failed`.
    pub async fn ingest(&self, document_id: Uuid, source: RawSource) {
        if let Err(e) = self.run(document_id, &source).await {
            tracing::error!("Ingestion of {} failed unexpectedly: {}", document_id, e);
            self.force_failed(document_id, &e);
        }
    }

    async fn run(&self, document_id: Uuid, source: &RawSource) -> Result<()> {
        // Re-ingestion starts a fresh cycle for the same id
        self.registry.reset_for_reingest(document_id)?;
        self.registry
            .update_status(document_id, DocumentStatus::Processing, None)?;

        let extracted = match self.extractor.extract(source).await {
            Ok(extracted) => extracted,
            Err(e) => {
                // Extraction errors are fatal to the document, not retried
                tracing::warn!("Extraction failed for {}: {}", source.name(), e);
                self.registry
                    .update_status(document_id, DocumentStatus::Failed, Some(&e.to_string()))?;
                return Ok(());
            }
        };

        if extracted.text.trim().is_empty() {
            self.registry.update_status(
                document_id,
                DocumentStatus::Failed,
                Some("extraction produced no usable text"),
            )?;
            return Ok(());
        }

        self.registry
            .update_status(document_id, DocumentStatus::Vectorizing, None)?;

        let pieces = self.chunker.chunk(&extracted.text);
        if pieces.is_empty() {
            self.registry.update_status(
                document_id,
                DocumentStatus::Failed,
                Some("chunker produced no chunks"),
            )?;
            return Ok(());
        }

        let mut chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|piece| Chunk::new(document_id, piece.index, piece.text))
            .collect();
        add_metadata(&mut chunks, &self.ingest_metadata(source, &extracted));

        // Overwrite any chunks from a prior run of this document
        let removed = self.store.delete_document(document_id).await?;
        if removed > 0 {
            tracing::info!("Re-ingesting {}: removed {} prior chunks", document_id, removed);
        }

        let total = chunks.len();
        let mut successful = 0u32;
        let mut embed_failures = 0usize;
        let mut store_failures = 0usize;
        let vectors_supported = self.store.supports_vectors();

        // Embed in bounded-concurrency batches; chunks are stored strictly in
        // index order regardless of embedding completion order.
        for batch in chunks.chunks_mut(self.parallel_embeddings) {
            let embeds = join_all(batch.iter().map(|chunk| self.embedder.embed(&chunk.text))).await;

            for (chunk, result) in batch.iter_mut().zip(embeds) {
                match result {
                    Ok(Some(vector)) => chunk.embedding = Some(vector),
                    Ok(None) => {
                        embed_failures += 1;
                        tracing::warn!(
                            "No embedding for chunk {} of {}, storing keyword-only",
                            chunk.index,
                            document_id
                        );
                    }
                    Err(e) => {
                        embed_failures += 1;
                        self.dead_letter_chunk(chunk, &e);
                    }
                }
            }

            for chunk in batch.iter_mut() {
                if !vectors_supported {
                    chunk.embedding = None;
                }
                let embedded = chunk.embedding.is_some();

                match self.store.put_chunk(chunk).await {
                    Ok(()) => {
                        // A text-only chunk still counts when the store has no
                        // vector capability at all: it was stored at full
                        // fidelity for that store.
                        if embedded || !vectors_supported {
                            successful += 1;
                        }
                    }
                    Err(Error::VectorRejected(msg)) => {
                        tracing::warn!(
                            "Store rejected vector for chunk {} of {}: {}; retrying text-only",
                            chunk.index,
                            document_id,
                            msg
                        );
                        chunk.embedding = None;
                        if let Err(e) = self.store.put_chunk(chunk).await {
                            store_failures += 1;
                            self.dead_letter_chunk(chunk, &e);
                        }
                    }
                    Err(e) => {
                        store_failures += 1;
                        self.dead_letter_chunk(chunk, &e);
                    }
                }
            }
        }

        self.registry
            .set_chunk_counts(document_id, total as u32, successful)?;

        let (status, reason) = if successful == 0 {
            (
                DocumentStatus::Failed,
                Some(format!(
                    "no chunks stored successfully ({} embed failures, {} storage failures)",
                    embed_failures, store_failures
                )),
            )
        } else if (successful as usize) < total {
            (
                DocumentStatus::Partial,
                Some(format!(
                    "{} of {} chunks stored ({} embed failures, {} storage failures)",
                    successful, total, embed_failures, store_failures
                )),
            )
        } else {
            (DocumentStatus::Completed, None)
        };

        self.registry
            .update_status(document_id, status, reason.as_deref())?;

        tracing::info!(
            "Ingested {}: {} chunks, {} successful, status {}",
            document_id,
            total,
            successful,
            status.as_str()
        );

        Ok(())
    }

    fn ingest_metadata(
        &self,
        source: &RawSource,
        extracted: &super::extract::ExtractedText,
    ) -> HashMap<String, serde_json::Value> {
        let mut metadata = HashMap::new();
        metadata.insert(
            "source_name".to_string(),
            serde_json::json!(source.name()),
        );
        let source_type = match source {
            RawSource::FileBytes { .. } => SourceType::File,
            RawSource::Url { .. } => SourceType::WebCrawl,
        };
        metadata.insert(
            "source_type".to_string(),
            serde_json::json!(source_type.as_str()),
        );
        metadata.insert(
            "word_count".to_string(),
            serde_json::json!(extracted.word_count),
        );
        if let Some(pages) = extracted.page_count {
            metadata.insert("page_count".to_string(), serde_json::json!(pages));
        }
        if let RawSource::Url { url } = source {
            metadata.insert("crawl_url".to_string(), serde_json::json!(url));
        }
        metadata
    }

    /// Record a chunk in the DLQ with everything needed to reprocess it
    fn dead_letter_chunk(&self, chunk: &Chunk, error: &Error) {
        let payload = serde_json::json!({
            "document_id": chunk.document_id,
            "chunk_id": chunk.id,
            "index": chunk.index,
            "text": chunk.text,
            "metadata": chunk.metadata,
        });
        if let Err(e) = self
            .dlq
            .add(DlqItemType::Chunk, chunk.id.to_string(), payload, error)
        {
            tracing::error!("Failed to dead-letter chunk {}: {}", chunk.id, e);
        }
    }

    /// Fail-safe boundary: force `Failed` and record the reason
    fn force_failed(&self, document_id: Uuid, error: &Error) {
        if let Err(e) =
            self.registry
                .update_status(document_id, DocumentStatus::Failed, Some(&error.to_string()))
        {
            tracing::error!("Could not mark {} as failed: {}", document_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkLimits, ChunkStrategy};
    use crate::config::{DlqConfig, EmbeddingConfig, RetryConfig};
    use crate::embedding::EmbeddingProvider;
    use crate::ingestion::extract::ExtractedText;
    use crate::retry::RetryPolicy;
    use crate::storage::MemoryChunkStore;
    use crate::types::Document;
    use async_trait::async_trait;

    /// Extractor that replays a fixed script
    struct FixedExtractor {
        text: String,
        fail: bool,
    }

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract(&self, source: &RawSource) -> Result<ExtractedText> {
            if self.fail {
                return Err(Error::extraction(source.name(), "unsupported format"));
            }
            Ok(ExtractedText {
                text: self.text.clone(),
                word_count: self.text.split_whitespace().count(),
                page_count: None,
            })
        }
    }

    /// Provider that fails for any text containing "zap"
    struct SelectiveProvider;

    #[async_trait]
    impl EmbeddingProvider for SelectiveProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("zap") {
                return Err(Error::Embedding("model refused".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0, 2.0])
        }

        fn model(&self) -> &str {
            "selective"
        }

        fn name(&self) -> &str {
            "selective"
        }
    }

    struct Harness {
        registry: Arc<RegistryDb>,
        store: Arc<MemoryChunkStore>,
        dlq: Arc<DeadLetterQueue>,
        pipeline: IngestionPipeline,
    }

    fn harness(text: &str, extract_fails: bool) -> Harness {
        let registry = Arc::new(RegistryDb::in_memory().unwrap());
        let store = Arc::new(MemoryChunkStore::new());
        let dlq = Arc::new(DeadLetterQueue::new(
            registry.clone(),
            &DlqConfig::default(),
        ));

        let config = EmbeddingConfig {
            dimensions: 3,
            ..Default::default()
        };
        let retry = RetryPolicy::new(&RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
            jitter: false,
        });
        let embedder = Arc::new(EmbeddingClient::new(
            Arc::new(SelectiveProvider),
            retry,
            &config,
        ));

        let extractor = Arc::new(FixedExtractor {
            text: text.to_string(),
            fail: extract_fails,
        });

        let pipeline = IngestionPipeline::new(
            registry.clone(),
            store.clone(),
            embedder,
            extractor,
            dlq.clone(),
            Chunker::new(
                ChunkStrategy::Paragraph,
                ChunkLimits {
                    chunk_size: 1024,
                    chunk_overlap: 0,
                    max_chunk_size: 40,
                },
            ),
            2,
        );

        Harness {
            registry,
            store,
            dlq,
            pipeline,
        }
    }

    fn register(harness: &Harness) -> Uuid {
        let doc = Document::new(
            "doc.txt".to_string(),
            SourceType::File,
            "hash".to_string(),
            100,
        );
        harness.registry.insert_document(&doc).unwrap();
        doc.id
    }

    #[tokio::test]
    async fn all_chunks_embedding_completes_the_document() {
        let harness = harness(
            "First passage stands alone.\n\nSecond passage stands alone.\n\nThird one too.",
            false,
        );
        let id = register(&harness);

        harness
            .pipeline
            .ingest(id, RawSource::FileBytes { name: "doc.txt".into(), data: vec![] })
            .await;

        let doc = harness.registry.get_document(id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.chunk_count, 3);
        assert_eq!(doc.successful_chunk_count, 3);
        assert_eq!(harness.store.len(), 3);
    }

    #[tokio::test]
    async fn empty_extraction_fails_the_document() {
        let harness = harness("   \n\n  ", false);
        let id = register(&harness);

        harness
            .pipeline
            .ingest(id, RawSource::FileBytes { name: "doc.txt".into(), data: vec![] })
            .await;

        let doc = harness.registry.get_document(id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(doc.failure_reason.unwrap().contains("no usable text"));
        assert_eq!(harness.store.len(), 0);
    }

    #[tokio::test]
    async fn extraction_error_fails_without_dead_lettering() {
        let harness = harness("irrelevant", true);
        let id = register(&harness);

        harness
            .pipeline
            .ingest(id, RawSource::FileBytes { name: "doc.bin".into(), data: vec![] })
            .await;

        let doc = harness.registry.get_document(id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        // Extraction errors are not retried through the DLQ
        assert_eq!(harness.dlq.stats().unwrap().total, 0);
    }

    #[tokio::test]
    async fn partial_embedding_yields_partial_with_exact_counts() {
        let harness = harness(
            "Clean passage number one.\n\nzap this passage hard.\n\nClean passage number three.",
            false,
        );
        let id = register(&harness);

        harness
            .pipeline
            .ingest(id, RawSource::FileBytes { name: "doc.txt".into(), data: vec![] })
            .await;

        let doc = harness.registry.get_document(id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Partial);
        assert_eq!(doc.chunk_count, 3);
        assert_eq!(doc.successful_chunk_count, 2);

        // The failed chunk is still stored for keyword search and dead-lettered
        assert_eq!(harness.store.len(), 3);
        let keyword_only = harness.store.keyword_search("zap", 10).await.unwrap();
        assert_eq!(keyword_only.len(), 1);
        assert_eq!(harness.dlq.stats().unwrap().pending, 1);
    }

    #[tokio::test]
    async fn every_embedding_failing_fails_the_document() {
        let harness = harness("zap one.\n\nzap two.", false);
        let id = register(&harness);

        harness
            .pipeline
            .ingest(id, RawSource::FileBytes { name: "doc.txt".into(), data: vec![] })
            .await;

        let doc = harness.registry.get_document(id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.successful_chunk_count, 0);
    }

    #[tokio::test]
    async fn reingestion_overwrites_instead_of_duplicating() {
        let harness = harness("Only passage here.", false);
        let id = register(&harness);
        let source = RawSource::FileBytes { name: "doc.txt".into(), data: vec![] };

        harness.pipeline.ingest(id, source.clone()).await;
        harness.pipeline.ingest(id, source).await;

        let doc = harness.registry.get_document(id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.chunk_count, 1);
        assert_eq!(harness.store.len(), 1);
    }

    #[tokio::test]
    async fn chunk_indices_are_preserved_in_storage() {
        let harness = harness(
            "Common word alpha starts things off.\n\nCommon word beta follows directly.\n\n\
             Common word gamma keeps it going.\n\nCommon word delta closes it out.",
            false,
        );
        let id = register(&harness);

        harness
            .pipeline
            .ingest(id, RawSource::FileBytes { name: "doc.txt".into(), data: vec![] })
            .await;

        let mut stored = harness.store.keyword_search("common", 10).await.unwrap();
        stored.sort_by_key(|s| s.chunk.index);
        let indices: Vec<u32> = stored.iter().map(|s| s.chunk.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn chunks_carry_ingest_metadata() {
        let harness = harness("Single passage.", false);
        let id = register(&harness);

        harness
            .pipeline
            .ingest(id, RawSource::Url { url: "https://example.com/page".into() })
            .await;

        let stored = harness.store.keyword_search("passage", 10).await.unwrap();
        let metadata = &stored[0].chunk.metadata;
        assert_eq!(metadata["source_type"], serde_json::json!("web_crawl"));
        assert_eq!(
            metadata["crawl_url"],
            serde_json::json!("https://example.com/page")
        );
    }
}
