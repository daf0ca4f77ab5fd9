//! Dead letter queue: durable record of work that exhausted its retries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DlqConfig;
use crate::error::{Error, Result};
use crate::storage::RegistryDb;

/// Kind of work item recorded in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqItemType {
    Document,
    Webpage,
    Chunk,
}

impl DlqItemType {
    /// Stable string form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Webpage => "webpage",
            Self::Chunk => "chunk",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(Self::Document),
            "webpage" => Some(Self::Webpage),
            "chunk" => Some(Self::Chunk),
            _ => None,
        }
    }
}

/// Lifecycle of a dead-lettered item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    /// Waiting for the next sweep
    Pending,
    /// Being reprocessed right now
    Processing,
    /// Retry budget exhausted; excluded from sweeps, kept for inspection
    Failed,
    /// Successfully reprocessed
    Resolved,
}

impl DlqStatus {
    /// Stable string form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Resolved => "resolved",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "failed" => Some(Self::Failed),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// A work item that exhausted its in-band retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub id: Uuid,
    pub item_type: DlqItemType,
    /// Identifier of the failed item (chunk id, document id, URL)
    pub item_id: String,
    /// Everything needed to reprocess the item later
    pub payload: serde_json::Value,
    pub last_error: String,
    /// Machine-readable error class (see `Error::kind`)
    pub error_type: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: DlqStatus,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl DeadLetterItem {
    /// Create a new pending item
    pub fn new(
        item_type: DlqItemType,
        item_id: String,
        payload: serde_json::Value,
        last_error: &str,
        error_type: &str,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_type,
            item_id,
            payload,
            last_error: last_error.to_string(),
            error_type: error_type.to_string(),
            retry_count: 0,
            max_retries,
            status: DlqStatus::Pending,
            created_at: Utc::now(),
            last_attempt_at: None,
        }
    }
}

/// Counts by status
#[derive(Debug, Clone, Default, Serialize)]
pub struct DlqStats {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
    pub resolved: u64,
    pub total: u64,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub attempted: usize,
    pub resolved: usize,
    pub retried: usize,
    pub exhausted: usize,
}

/// Durable dead letter queue over the registry database
pub struct DeadLetterQueue {
    db: Arc<RegistryDb>,
    max_retries: u32,
    retry_window_secs: u64,
}

impl DeadLetterQueue {
    /// Create a queue over the registry database
    pub fn new(db: Arc<RegistryDb>, config: &DlqConfig) -> Self {
        Self {
            db,
            max_retries: config.max_retries,
            retry_window_secs: config.retry_window_secs,
        }
    }

    /// Record a failed item, returning its queue id
    pub fn add(
        &self,
        item_type: DlqItemType,
        item_id: String,
        payload: serde_json::Value,
        error: &Error,
    ) -> Result<Uuid> {
        let item = DeadLetterItem::new(
            item_type,
            item_id,
            payload,
            &error.to_string(),
            error.kind(),
            self.max_retries,
        );
        self.db.dlq_add(&item)?;
        tracing::info!(
            "Dead-lettered {} '{}' ({}): {}",
            item.item_type.as_str(),
            item.item_id,
            item.error_type,
            item.last_error
        );
        Ok(item.id)
    }

    /// Items eligible for reprocessing
    pub fn get_pending(&self, limit: usize) -> Result<Vec<DeadLetterItem>> {
        self.db.dlq_get_pending(limit, self.retry_window_secs)
    }

    /// Mark an item as being reprocessed
    pub fn mark_processing(&self, id: Uuid) -> Result<()> {
        self.db.dlq_mark_processing(id)
    }

    /// Mark an item as successfully reprocessed
    pub fn mark_resolved(&self, id: Uuid) -> Result<()> {
        self.db.dlq_mark_resolved(id)
    }

    /// Record a failed attempt; returns the item's new status
    pub fn increment_retry(&self, id: Uuid, error: &str) -> Result<DlqStatus> {
        self.db.dlq_increment_retry(id, error)
    }

    /// Counts by status
    pub fn stats(&self) -> Result<DlqStats> {
        let mut stats = DlqStats::default();
        for (status, count) in self.db.dlq_stats()? {
            match status {
                DlqStatus::Pending => stats.pending = count,
                DlqStatus::Processing => stats.processing = count,
                DlqStatus::Failed => stats.failed = count,
                DlqStatus::Resolved => stats.resolved = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// Explicit cleanup of resolved items
    pub fn purge_resolved(&self) -> Result<usize> {
        self.db.dlq_purge_resolved()
    }

    /// One sweep pass: pull pending items, attempt each through `reprocess`,
    /// and resolve or increment. One item's failure never aborts the batch.
    pub async fn sweep<F, Fut>(&self, batch_size: usize, reprocess: F) -> SweepOutcome
    where
        F: Fn(DeadLetterItem) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut outcome = SweepOutcome::default();

        let items = match self.get_pending(batch_size) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("DLQ sweep could not load pending items: {}", e);
                return outcome;
            }
        };

        for item in items {
            let id = item.id;
            outcome.attempted += 1;

            if let Err(e) = self.mark_processing(id) {
                tracing::error!("DLQ sweep could not mark {} processing: {}", id, e);
                continue;
            }

            match reprocess(item).await {
                Ok(()) => {
                    if let Err(e) = self.mark_resolved(id) {
                        tracing::error!("DLQ sweep could not resolve {}: {}", id, e);
                    } else {
                        outcome.resolved += 1;
                    }
                }
                Err(e) => match self.increment_retry(id, &e.to_string()) {
                    Ok(DlqStatus::Failed) => {
                        outcome.exhausted += 1;
                        tracing::warn!("DLQ item {} exhausted its retries: {}", id, e);
                    }
                    Ok(_) => {
                        outcome.retried += 1;
                    }
                    Err(db_err) => {
                        tracing::error!("DLQ sweep could not record retry for {}: {}", id, db_err);
                    }
                },
            }
        }

        if outcome.attempted > 0 {
            tracing::info!(
                "DLQ sweep: {} attempted, {} resolved, {} retried, {} exhausted",
                outcome.attempted,
                outcome.resolved,
                outcome.retried,
                outcome.exhausted
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> DeadLetterQueue {
        let db = Arc::new(RegistryDb::in_memory().unwrap());
        DeadLetterQueue::new(
            db,
            &DlqConfig {
                max_retries: 2,
                retry_window_secs: 0,
                sweep_interval_secs: 0,
                sweep_batch_size: 10,
            },
        )
    }

    #[tokio::test]
    async fn sweep_resolves_successful_items() {
        let dlq = queue();
        dlq.add(
            DlqItemType::Chunk,
            "c1".to_string(),
            serde_json::json!({"text": "x"}),
            &Error::Embedding("boom".to_string()),
        )
        .unwrap();

        let outcome = dlq.sweep(10, |_item| async { Ok(()) }).await;
        assert_eq!(outcome.attempted, 1);
        assert_eq!(outcome.resolved, 1);

        let stats = dlq.stats().unwrap();
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn sweep_failure_does_not_abort_the_batch() {
        let dlq = queue();
        dlq.add(
            DlqItemType::Chunk,
            "bad".to_string(),
            serde_json::json!({}),
            &Error::Embedding("boom".to_string()),
        )
        .unwrap();
        dlq.add(
            DlqItemType::Chunk,
            "good".to_string(),
            serde_json::json!({}),
            &Error::Embedding("boom".to_string()),
        )
        .unwrap();

        let outcome = dlq
            .sweep(10, |item| async move {
                if item.item_id == "bad" {
                    Err(Error::Embedding("still failing".to_string()))
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.resolved, 1);
        assert_eq!(outcome.retried, 1);
    }

    #[tokio::test]
    async fn repeated_failures_exhaust_and_leave_the_sweep() {
        let dlq = queue();
        dlq.add(
            DlqItemType::Chunk,
            "c1".to_string(),
            serde_json::json!({}),
            &Error::Embedding("boom".to_string()),
        )
        .unwrap();

        let fail = |_item: DeadLetterItem| async { Err(Error::Embedding("no".to_string())) };

        let first = dlq.sweep(10, fail).await;
        assert_eq!(first.retried, 1);

        let second = dlq.sweep(10, fail).await;
        assert_eq!(second.exhausted, 1);

        // Exhausted items are gone from subsequent sweeps
        let third = dlq.sweep(10, fail).await;
        assert_eq!(third.attempted, 0);
        assert_eq!(dlq.stats().unwrap().failed, 1);
    }
}
