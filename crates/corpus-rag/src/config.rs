//! Configuration for the ingestion and retrieval engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Retrieval and fusion configuration
    pub retrieval: RetrievalConfig,
    /// Retry policy defaults for flaky external calls
    pub retry: RetryConfig,
    /// Dead letter queue configuration
    pub dlq: DlqConfig,
    /// Background processing configuration
    pub processing: ProcessingConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Answer generation configuration (optional collaborator)
    pub generation: GenerationConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// Embedding provider selection; unknown providers fail at deserialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Ollama-compatible /api/embeddings endpoint
    Ollama,
    /// OpenAI-compatible /v1/embeddings endpoint
    OpenAi,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider backend
    pub backend: EmbeddingBackend,
    /// Provider base URL
    pub base_url: String,
    /// API key, if the provider requires one
    pub api_key: Option<String>,
    /// Model identifier (part of the cache key)
    pub model: String,
    /// Expected embedding dimensions
    pub dimensions: usize,
    /// Maximum input length in characters; longer inputs are truncated
    pub max_input_chars: usize,
    /// Length of the normalized-text prefix used for the cache fingerprint
    pub fingerprint_prefix_chars: usize,
    /// Cache capacity (entries)
    pub cache_max_entries: usize,
    /// Cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            max_input_chars: 8192,
            fingerprint_prefix_chars: 512,
            cache_max_entries: 10_000,
            cache_ttl_secs: 24 * 3600,
            timeout_secs: 60,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunking strategy: "fixed", "paragraph", or "sentence"
    pub strategy: crate::chunking::ChunkStrategy,
    /// Target chunk size in characters (window size for "fixed")
    pub chunk_size: usize,
    /// Overlap between chunks in characters ("fixed" only)
    pub chunk_overlap: usize,
    /// Soft upper bound for accumulation strategies
    pub max_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: crate::chunking::ChunkStrategy::Paragraph,
            chunk_size: 1024,
            chunk_overlap: 200,
            max_chunk_size: 1500,
        }
    }
}

/// Retrieval and fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight applied to vector-branch scores
    pub vector_weight: f32,
    /// Weight applied to keyword-branch scores
    pub keyword_weight: f32,
    /// Confidence assigned to keyword hits when the store cannot rank them
    pub keyword_confidence: f32,
    /// Default number of results returned
    pub default_top_k: usize,
    /// Per-branch timeout in milliseconds; a timed-out branch degrades to the other
    pub branch_timeout_ms: u64,
    /// Query-result cache capacity (entries)
    pub cache_max_entries: usize,
    /// Query-result cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Enable the second-pass re-ranker
    pub rerank_enabled: bool,
    /// Re-ranker endpoint URL
    pub rerank_url: Option<String>,
    /// Number of fused results handed to the re-ranker
    pub rerank_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            keyword_weight: 0.3,
            keyword_confidence: 0.6,
            default_top_k: 5,
            branch_timeout_ms: 5_000,
            cache_max_entries: 1_000,
            cache_ttl_secs: 60,
            rerank_enabled: false,
            rerank_url: None,
            rerank_top_n: 10,
        }
    }
}

/// Retry policy defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts (including the first)
    pub max_attempts: u32,
    /// Base delay in milliseconds
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Apply +/-10% random jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Dead letter queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DlqConfig {
    /// Maximum automatic retries per item
    pub max_retries: u32,
    /// Minimum age of the last attempt before an item is swept again, in seconds
    pub retry_window_secs: u64,
    /// Sweep interval in seconds; 0 disables the sweeper
    pub sweep_interval_secs: u64,
    /// Maximum items pulled per sweep
    pub sweep_batch_size: usize,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_window_secs: 300,
            sweep_interval_secs: 600,
            sweep_batch_size: 50,
        }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of documents ingested in parallel; defaults to min(cpus, 4)
    pub worker_pool_size: Option<usize>,
    /// Bounded concurrency for per-chunk embedding within one document
    pub parallel_embeddings: usize,
    /// Per-document processing timeout in seconds
    pub document_timeout_secs: u64,
    /// Queue capacity for pending ingest jobs
    pub queue_capacity: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: None,
            parallel_embeddings: 4,
            document_timeout_secs: 600,
            queue_capacity: 1_000,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database (registry + chunks + DLQ)
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/corpus.db"),
        }
    }
}

/// LLM provider selection; unknown providers fail at deserialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackend {
    Gemini,
    OpenAi,
    OpenRouter,
    HuggingFace,
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Enable answer generation from retrieved context
    pub enabled: bool,
    /// Provider backend
    pub backend: LlmBackend,
    /// Provider base URL override (defaults per backend)
    pub base_url: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: LlmBackend::OpenAi,
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fusion_contract() {
        let config = EngineConfig::default();
        assert!((config.retrieval.vector_weight - 0.7).abs() < f32::EPSILON);
        assert!((config.retrieval.keyword_weight - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
    }

    #[test]
    fn unknown_backend_is_rejected_at_parse_time() {
        let toml = r#"
            [embeddings]
            backend = "acme"
        "#;
        let parsed: std::result::Result<EngineConfig, _> = toml::from_str(toml);
        assert!(parsed.is_err());
    }
}
