//! corpus-rag: knowledge ingestion and hybrid retrieval engine
//!
//! Ingests unstructured documents into a searchable store (chunking, cached
//! embeddings, a per-document status machine with partial-failure semantics)
//! and answers queries through a hybrid vector + keyword pipeline with
//! weighted fusion and optional re-ranking. Flaky external calls go through
//! a bounded-backoff retry policy; work that exhausts its retries lands in a
//! durable dead letter queue swept in the background.

pub mod chunking;
pub mod config;
pub mod dlq;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use types::{Chunk, Document, DocumentStatus, RankedPassage, SourceType};
