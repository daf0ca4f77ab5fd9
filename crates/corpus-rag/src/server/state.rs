//! Application state wiring for the engine server

use std::sync::Arc;
use std::time::Duration;

use crate::chunking::{ChunkLimits, Chunker};
use crate::config::EngineConfig;
use crate::dlq::{DeadLetterItem, DeadLetterQueue, DlqItemType};
use crate::embedding::{build_provider, EmbeddingClient};
use crate::error::{Error, Result};
use crate::generation::LlmClient;
use crate::ingestion::{DefaultExtractor, IngestionPipeline};
use crate::processing::{IngestQueue, IngestWorker};
use crate::retrieval::{HttpReranker, HybridRetriever, RerankProvider};
use crate::retry::RetryPolicy;
use crate::storage::{ChunkStore, RegistryDb, SqliteChunkStore};
use crate::types::Chunk;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: EngineConfig,
    registry: Arc<RegistryDb>,
    store: Arc<dyn ChunkStore>,
    retriever: Arc<HybridRetriever>,
    queue: IngestQueue,
    dlq: Arc<DeadLetterQueue>,
    llm: Option<LlmClient>,
}

impl AppState {
    /// Wire up all components and start the background worker and DLQ sweeper
    pub async fn new(config: EngineConfig) -> Result<Self> {
        tracing::info!("Initializing engine state...");

        let registry = Arc::new(RegistryDb::new(&config.storage.database_path)?);
        let store: Arc<dyn ChunkStore> =
            Arc::new(SqliteChunkStore::new(&config.storage.database_path)?);
        tracing::info!(
            "Storage opened at {} (store: {})",
            config.storage.database_path.display(),
            store.name()
        );

        let provider = build_provider(&config.embeddings)?;
        tracing::info!(
            "Embedding provider: {} (model {})",
            provider.name(),
            provider.model()
        );
        let retry = RetryPolicy::new(&config.retry);
        let embedder = Arc::new(EmbeddingClient::new(provider, retry, &config.embeddings));

        let reranker: Option<Arc<dyn RerankProvider>> = if config.retrieval.rerank_enabled {
            let url = config.retrieval.rerank_url.clone().ok_or_else(|| {
                Error::Config("rerank_enabled requires rerank_url".to_string())
            })?;
            tracing::info!("Re-ranker enabled at {}", url);
            Some(Arc::new(HttpReranker::new(url, 30)?))
        } else {
            None
        };

        let retriever = Arc::new(HybridRetriever::new(
            store.clone(),
            embedder.clone(),
            reranker,
            &config.retrieval,
        ));

        let dlq = Arc::new(DeadLetterQueue::new(registry.clone(), &config.dlq));

        let llm = if config.generation.enabled {
            let client = LlmClient::new(&config.generation)?;
            tracing::info!("Generation provider: {}", client.name());
            Some(client)
        } else {
            None
        };

        let chunker = Chunker::new(
            config.chunking.strategy,
            ChunkLimits {
                chunk_size: config.chunking.chunk_size,
                chunk_overlap: config.chunking.chunk_overlap,
                max_chunk_size: config.chunking.max_chunk_size,
            },
        );

        let pipeline = Arc::new(IngestionPipeline::new(
            registry.clone(),
            store.clone(),
            embedder.clone(),
            Arc::new(DefaultExtractor::new(30)?),
            dlq.clone(),
            chunker,
            config.processing.parallel_embeddings,
        ));

        let (queue, receiver) =
            IngestQueue::new(registry.clone(), store.clone(), config.processing.queue_capacity);

        let worker = IngestWorker::new(pipeline, registry.clone(), &config.processing);
        let depth = queue.depth_handle();
        tokio::spawn(worker.run(receiver, move || {
            depth.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }));

        if config.dlq.sweep_interval_secs > 0 {
            Self::spawn_sweeper(
                dlq.clone(),
                embedder.clone(),
                store.clone(),
                config.dlq.sweep_interval_secs,
                config.dlq.sweep_batch_size,
            );
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                registry,
                store,
                retriever,
                queue,
                dlq,
                llm,
            }),
        })
    }

    /// Periodic DLQ sweep: re-embed dead chunks through the normal path
    fn spawn_sweeper(
        dlq: Arc<DeadLetterQueue>,
        embedder: Arc<EmbeddingClient>,
        store: Arc<dyn ChunkStore>,
        interval_secs: u64,
        batch_size: usize,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let embedder = embedder.clone();
                let store = store.clone();
                dlq.sweep(batch_size, move |item| {
                    let embedder = embedder.clone();
                    let store = store.clone();
                    async move { reprocess_item(&embedder, store.as_ref(), item).await }
                })
                .await;
            }
        });
        tracing::info!("DLQ sweeper started (every {}s)", interval_secs);
    }

    /// Get configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Get the document registry
    pub fn registry(&self) -> &Arc<RegistryDb> {
        &self.inner.registry
    }

    /// Get the chunk store
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.inner.store
    }

    /// Get the hybrid retriever
    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.inner.retriever
    }

    /// Get the ingest queue
    pub fn queue(&self) -> &IngestQueue {
        &self.inner.queue
    }

    /// Get the dead letter queue
    pub fn dlq(&self) -> &Arc<DeadLetterQueue> {
        &self.inner.dlq
    }

    /// Get the generation client, if enabled
    pub fn llm(&self) -> Option<&LlmClient> {
        self.inner.llm.as_ref()
    }
}

/// Reprocess one dead-lettered item. Only chunk items are automatic; other
/// types stay in the queue for manual handling.
async fn reprocess_item(
    embedder: &EmbeddingClient,
    store: &dyn ChunkStore,
    item: DeadLetterItem,
) -> Result<()> {
    if item.item_type != DlqItemType::Chunk {
        return Err(Error::Internal(format!(
            "no automatic reprocessing for item type '{}'",
            item.item_type.as_str()
        )));
    }

    let payload = &item.payload;
    let text = payload["text"]
        .as_str()
        .ok_or_else(|| Error::Internal("chunk payload missing text".to_string()))?;
    let document_id = payload["document_id"]
        .as_str()
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        .ok_or_else(|| Error::Internal("chunk payload missing document_id".to_string()))?;
    let chunk_id = payload["chunk_id"]
        .as_str()
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        .ok_or_else(|| Error::Internal("chunk payload missing chunk_id".to_string()))?;
    let index = payload["index"].as_u64().unwrap_or(0) as u32;
    let metadata = payload["metadata"].as_object().map(|m| {
        m.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    });

    let vector = embedder
        .embed(text)
        .await?
        .ok_or_else(|| Error::Embedding("provider produced no embedding".to_string()))?;

    let chunk = Chunk {
        id: chunk_id,
        document_id,
        index,
        text: text.to_string(),
        embedding: Some(vector),
        metadata: metadata.unwrap_or_default(),
    };
    store.put_chunk(&chunk).await
}
