//! Ingest queue: immediate acknowledgment, background processing
//!
//! `submit` registers the document in `Pending`, hands the job to the worker
//! pool, and returns. The only observable signal of progress afterwards is
//! the document's status field.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::ingestion::RawSource;
use crate::storage::{ChunkStore, RegistryDb};
use crate::types::{Document, DocumentStatus, SourceType};

/// A unit of background ingestion work
#[derive(Debug)]
pub struct IngestJob {
    pub document_id: uuid::Uuid,
    pub source: RawSource,
}

/// Outcome of a submission
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Document registered in `Pending`; processing continues in the background
    Accepted(Document),
    /// Content already known; nothing enqueued
    Skipped { reason: String, existing: Document },
}

/// Queue feeding the ingest worker pool
pub struct IngestQueue {
    registry: Arc<RegistryDb>,
    store: Arc<dyn ChunkStore>,
    sender: mpsc::Sender<IngestJob>,
    depth: Arc<AtomicUsize>,
}

impl IngestQueue {
    /// Create the queue and the receiver end for the worker
    pub fn new(
        registry: Arc<RegistryDb>,
        store: Arc<dyn ChunkStore>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<IngestJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                registry,
                store,
                sender,
                depth: Arc::new(AtomicUsize::new(0)),
            },
            receiver,
        )
    }

    /// Register a source and enqueue it for ingestion.
    ///
    /// Content already ingested under the same name is skipped; the same
    /// content under another name is reported as a duplicate; a known name
    /// with new content replaces the prior document and its chunks.
    pub async fn submit(&self, source: RawSource) -> Result<SubmitOutcome> {
        let name = source.name().to_string();
        let content_hash = hash_source(&source);
        let source_type = match &source {
            RawSource::FileBytes { .. } => SourceType::File,
            RawSource::Url { .. } => SourceType::WebCrawl,
        };

        if let Some(existing) = self.registry.find_by_hash(&content_hash)? {
            let reason = if existing.name == name {
                format!("unchanged (hash {})", &content_hash[..12])
            } else {
                format!("duplicate of '{}'", existing.name)
            };
            tracing::info!("Skipping '{}': {}", name, reason);
            return Ok(SubmitOutcome::Skipped { reason, existing });
        }

        if let Some(existing) = self.registry.find_by_name(&name)? {
            // Same name, new content: replace the prior document entirely
            let removed = self.store.delete_document(existing.id).await?;
            self.registry.delete_document(existing.id)?;
            tracing::info!(
                "'{}' modified: removed prior document {} ({} chunks)",
                name,
                existing.id,
                removed
            );
        }

        let doc = Document::new(name, source_type, content_hash, source.size_bytes());
        self.registry.insert_document(&doc)?;

        let job = IngestJob {
            document_id: doc.id,
            source,
        };

        self.depth.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.sender.send(job).await {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.registry.update_status(
                doc.id,
                DocumentStatus::Failed,
                Some("ingest queue unavailable"),
            )?;
            return Err(Error::Internal(format!("Failed to enqueue job: {}", e)));
        }

        tracing::info!("Accepted '{}' as document {}", doc.name, doc.id);
        Ok(SubmitOutcome::Accepted(doc))
    }

    /// Called by the worker when a job leaves the queue
    pub fn job_taken(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    /// Shared depth gauge for the worker side
    pub fn depth_handle(&self) -> Arc<AtomicUsize> {
        self.depth.clone()
    }

    /// Jobs currently waiting or running
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

fn hash_source(source: &RawSource) -> String {
    let mut hasher = Sha256::new();
    match source {
        RawSource::FileBytes { data, .. } => hasher.update(data),
        RawSource::Url { url } => hasher.update(url.as_bytes()),
    }
    hex::encode(hasher.finalize())
}
