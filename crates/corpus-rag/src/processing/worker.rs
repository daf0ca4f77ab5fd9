//! Background worker pool for document ingestion

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use crate::config::ProcessingConfig;
use crate::ingestion::IngestionPipeline;
use crate::storage::RegistryDb;
use crate::types::DocumentStatus;

use super::queue::IngestJob;

/// Worker pool: documents ingest independently in parallel, bounded by the
/// pool size so the embedding provider is not saturated.
pub struct IngestWorker {
    pipeline: Arc<IngestionPipeline>,
    registry: Arc<RegistryDb>,
    pool_size: usize,
    document_timeout: Duration,
}

impl IngestWorker {
    /// Create a worker over the pipeline
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        registry: Arc<RegistryDb>,
        config: &ProcessingConfig,
    ) -> Self {
        let pool_size = config
            .worker_pool_size
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1);

        tracing::info!(
            "Ingest worker configured: {} parallel documents, {}s timeout",
            pool_size,
            config.document_timeout_secs
        );

        Self {
            pipeline,
            registry,
            pool_size,
            document_timeout: Duration::from_secs(config.document_timeout_secs),
        }
    }

    /// Drain the queue until it closes. Each document runs in its own
    /// supervised task: a timeout or escaped failure lands in the document's
    /// status, never in the caller.
    pub async fn run(self, mut receiver: mpsc::Receiver<IngestJob>, on_taken: impl Fn() + Send + 'static) {
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        tracing::info!("Ingest worker started ({} slots)", self.pool_size);

        while let Some(job) = receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            on_taken();
            let pipeline = self.pipeline.clone();
            let registry = self.registry.clone();
            let doc_timeout = self.document_timeout;

            tokio::spawn(async move {
                let _permit = permit;
                let document_id = job.document_id;
                tracing::info!("Ingesting document {} ('{}')", document_id, job.source.name());

                if timeout(doc_timeout, pipeline.ingest(document_id, job.source))
                    .await
                    .is_err()
                {
                    tracing::error!(
                        "Ingestion of {} timed out after {}s",
                        document_id,
                        doc_timeout.as_secs()
                    );
                    if let Err(e) = registry.update_status(
                        document_id,
                        DocumentStatus::Failed,
                        Some(&format!(
                            "processing timeout after {}s",
                            doc_timeout.as_secs()
                        )),
                    ) {
                        tracing::error!("Could not mark {} as failed: {}", document_id, e);
                    }
                }
            });
        }

        tracing::info!("Ingest worker stopped");
    }
}
