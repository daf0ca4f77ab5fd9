//! Shared types for documents, chunks, and the HTTP surface

pub mod document;
pub mod query;
pub mod response;

pub use document::{Chunk, Document, DocumentStatus, SourceType};
pub use query::{CrawlRequest, SearchRequest};
pub use response::{DlqStatsResponse, DocumentSummary, IngestAccepted, RankedPassage, SearchResponse};
