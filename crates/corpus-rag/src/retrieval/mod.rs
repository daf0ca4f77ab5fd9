//! Hybrid retrieval: fusion, caching, and re-ranking

pub mod fusion;
pub mod query_cache;
pub mod rerank;
pub mod search;

pub use fusion::{fuse, FusionWeights};
pub use query_cache::QueryCache;
pub use rerank::{HttpReranker, RerankProvider};
pub use search::HybridRetriever;
