//! SQLite registry: durable document records and the dead letter queue

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::dlq::{DeadLetterItem, DlqItemType, DlqStatus};
use crate::error::{Error, Result};
use crate::types::{Document, DocumentStatus, SourceType};

/// SQLite-backed registry for documents and dead-lettered work items
pub struct RegistryDb {
    conn: Arc<Mutex<Connection>>,
}

impl RegistryDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                source_type TEXT NOT NULL,
                status TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                successful_chunk_count INTEGER NOT NULL DEFAULT 0,
                failure_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
            CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash);

            CREATE TABLE IF NOT EXISTS dead_letter_queue (
                id TEXT PRIMARY KEY,
                item_type TEXT NOT NULL,
                item_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                last_error TEXT NOT NULL,
                error_type TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                last_attempt_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_dlq_status ON dead_letter_queue(status);
        "#,
        )?;

        Ok(())
    }

    // --- documents ---

    /// Insert a new document record
    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO documents
               (id, name, source_type, status, size_bytes, content_hash,
                chunk_count, successful_chunk_count, failure_reason, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                doc.id.to_string(),
                doc.name,
                doc.source_type.as_str(),
                doc.status.as_str(),
                doc.size_bytes as i64,
                doc.content_hash,
                doc.chunk_count as i64,
                doc.successful_chunk_count as i64,
                doc.failure_reason,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch a document by id
    pub fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id.to_string()],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// List all documents, newest first
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM documents ORDER BY created_at DESC")?;
        let docs = stmt
            .query_map([], row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    /// Find a document by content hash
    pub fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE content_hash = ?1 LIMIT 1",
                params![content_hash],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// Find a document by display name
    pub fn find_by_name(&self, name: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE name = ?1 LIMIT 1",
                params![name],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// Transition a document's status, enforcing the forward-only machine.
    /// The read-validate-write runs under one lock, so concurrent readers see
    /// either the old or the new status, never an intermediate.
    pub fn update_status(
        &self,
        id: Uuid,
        to: DocumentStatus,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let current = current.ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        let from = DocumentStatus::parse(&current)
            .ok_or_else(|| Error::Storage(format!("Unknown status in registry: {}", current)))?;

        if from == to {
            return Ok(());
        }
        if !from.can_transition(to) {
            return Err(Error::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        conn.execute(
            "UPDATE documents SET status = ?1, failure_reason = ?2, updated_at = ?3 WHERE id = ?4",
            params![to.as_str(), failure_reason, Utc::now(), id.to_string()],
        )?;
        Ok(())
    }

    /// Record chunk counters after ingestion
    pub fn set_chunk_counts(&self, id: Uuid, chunk_count: u32, successful: u32) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"UPDATE documents
               SET chunk_count = ?1, successful_chunk_count = ?2, updated_at = ?3
               WHERE id = ?4"#,
            params![chunk_count as i64, successful as i64, Utc::now(), id.to_string()],
        )?;
        Ok(())
    }

    /// Start a fresh ingestion cycle for an existing document: status back to
    /// `pending`, counters and failure reason cleared. Re-ingestion begins a
    /// new cycle; transitions stay forward-only within each cycle.
    pub fn reset_for_reingest(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            r#"UPDATE documents
               SET status = 'pending', chunk_count = 0, successful_chunk_count = 0,
                   failure_reason = NULL, updated_at = ?1
               WHERE id = ?2"#,
            params![Utc::now(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a document record
    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    // --- dead letter queue ---

    /// Insert a dead-lettered item
    pub fn dlq_add(&self, item: &DeadLetterItem) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO dead_letter_queue
               (id, item_type, item_id, payload, last_error, error_type,
                retry_count, max_retries, status, created_at, last_attempt_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                item.id.to_string(),
                item.item_type.as_str(),
                item.item_id,
                item.payload.to_string(),
                item.last_error,
                item.error_type,
                item.retry_count as i64,
                item.max_retries as i64,
                item.status.as_str(),
                item.created_at,
                item.last_attempt_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch an item by id
    pub fn dlq_get(&self, id: Uuid) -> Result<Option<DeadLetterItem>> {
        let conn = self.conn.lock();
        let item = conn
            .query_row(
                "SELECT * FROM dead_letter_queue WHERE id = ?1",
                params![id.to_string()],
                row_to_dlq_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Pending items eligible for a sweep: retry budget remaining and last
    /// attempt (if any) older than the retry window. Failed items never
    /// appear here.
    pub fn dlq_get_pending(&self, limit: usize, retry_window_secs: u64) -> Result<Vec<DeadLetterItem>> {
        let cutoff = Utc::now() - Duration::seconds(retry_window_secs as i64);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM dead_letter_queue
               WHERE status = 'pending'
                 AND retry_count < max_retries
                 AND (last_attempt_at IS NULL OR last_attempt_at <= ?1)
               ORDER BY created_at ASC
               LIMIT ?2"#,
        )?;
        let items = stmt
            .query_map(params![cutoff, limit as i64], row_to_dlq_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Mark an item as being reprocessed
    pub fn dlq_mark_processing(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE dead_letter_queue SET status = 'processing', last_attempt_at = ?1 WHERE id = ?2",
            params![Utc::now(), id.to_string()],
        )?;
        Ok(())
    }

    /// Mark an item as successfully reprocessed
    pub fn dlq_mark_resolved(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE dead_letter_queue SET status = 'resolved', last_attempt_at = ?1 WHERE id = ?2",
            params![Utc::now(), id.to_string()],
        )?;
        Ok(())
    }

    /// Record a failed reprocessing attempt. When the retry budget is
    /// exhausted the item self-transitions to `failed` and leaves the
    /// automatic sweep; it stays visible for manual inspection.
    pub fn dlq_increment_retry(&self, id: Uuid, error: &str) -> Result<DlqStatus> {
        let conn = self.conn.lock();

        let (retry_count, max_retries): (i64, i64) = conn.query_row(
            "SELECT retry_count, max_retries FROM dead_letter_queue WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let new_count = retry_count + 1;
        let new_status = if new_count >= max_retries {
            DlqStatus::Failed
        } else {
            DlqStatus::Pending
        };

        conn.execute(
            r#"UPDATE dead_letter_queue
               SET retry_count = ?1, status = ?2, last_error = ?3, last_attempt_at = ?4
               WHERE id = ?5"#,
            params![new_count, new_status.as_str(), error, Utc::now(), id.to_string()],
        )?;

        Ok(new_status)
    }

    /// Counts by status
    pub fn dlq_stats(&self) -> Result<Vec<(DlqStatus, u64)>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM dead_letter_queue GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count as u64))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(s, c)| DlqStatus::parse(&s).map(|status| (status, c)))
            .collect())
    }

    /// Explicit cleanup of resolved items; nothing is deleted automatically
    pub fn dlq_purge_resolved(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM dead_letter_queue WHERE status = 'resolved'", [])?;
        Ok(affected)
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get("id")?;
    let source_type: String = row.get("source_type")?;
    let status: String = row.get("status")?;
    let size_bytes: i64 = row.get("size_bytes")?;
    let chunk_count: i64 = row.get("chunk_count")?;
    let successful: i64 = row.get("successful_chunk_count")?;
    let created_at: DateTime<Utc> = row.get("created_at")?;
    let updated_at: DateTime<Utc> = row.get("updated_at")?;

    Ok(Document {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        name: row.get("name")?,
        source_type: SourceType::parse(&source_type).unwrap_or(SourceType::File),
        status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Failed),
        size_bytes: size_bytes as u64,
        content_hash: row.get("content_hash")?,
        chunk_count: chunk_count as u32,
        successful_chunk_count: successful as u32,
        failure_reason: row.get("failure_reason")?,
        created_at,
        updated_at,
    })
}

fn row_to_dlq_item(row: &Row<'_>) -> rusqlite::Result<DeadLetterItem> {
    let id: String = row.get("id")?;
    let item_type: String = row.get("item_type")?;
    let payload: String = row.get("payload")?;
    let retry_count: i64 = row.get("retry_count")?;
    let max_retries: i64 = row.get("max_retries")?;
    let status: String = row.get("status")?;
    let created_at: DateTime<Utc> = row.get("created_at")?;
    let last_attempt_at: Option<DateTime<Utc>> = row.get("last_attempt_at")?;

    Ok(DeadLetterItem {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        item_type: DlqItemType::parse(&item_type).unwrap_or(DlqItemType::Chunk),
        item_id: row.get("item_id")?,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        last_error: row.get("last_error")?,
        error_type: row.get("error_type")?,
        retry_count: retry_count as u32,
        max_retries: max_retries as u32,
        status: DlqStatus::parse(&status).unwrap_or(DlqStatus::Pending),
        created_at,
        last_attempt_at,
    })
}
