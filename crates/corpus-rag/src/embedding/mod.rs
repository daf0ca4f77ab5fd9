//! Embedding generation with fingerprint caching

pub mod cache;
pub mod client;
pub mod provider;

pub use cache::EmbeddingCache;
pub use client::EmbeddingClient;
pub use provider::{build_provider, EmbeddingProvider, OllamaEmbedder, OpenAiEmbedder};
