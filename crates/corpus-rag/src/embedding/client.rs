//! Embedding client with content-fingerprint caching and retry

use futures_util::future::join_all;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use crate::retry::RetryPolicy;

use super::cache::EmbeddingCache;
use super::provider::EmbeddingProvider;

/// Embedding client: normalizes input, memoizes by fingerprint, and routes
/// provider calls through the retry policy.
///
/// `embed` returns `Ok(None)` when the provider yields an empty or
/// dimension-mismatched vector: the text could not be embedded, but the
/// caller can still fall back to keyword-only handling.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    retry: RetryPolicy,
    dimensions: usize,
    max_input_chars: usize,
    fingerprint_prefix_chars: usize,
}

impl EmbeddingClient {
    /// Create a new client
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(config.cache_max_entries, config.cache_ttl_secs),
            retry,
            dimensions: config.dimensions,
            max_input_chars: config.max_input_chars,
            fingerprint_prefix_chars: config.fingerprint_prefix_chars,
        }
    }

    /// Trim and cap the input before hashing or sending
    fn normalize(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.chars().count() > self.max_input_chars {
            trimmed.chars().take(self.max_input_chars).collect()
        } else {
            trimmed.to_string()
        }
    }

    /// Embed one text
    ///
    /// Cache hits skip the provider entirely. Provider errors propagate after
    /// the retry budget; a well-formed but unusable response maps to
    /// `Ok(None)`.
    pub async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            return Ok(None);
        }

        let key = EmbeddingCache::fingerprint(
            self.provider.model(),
            &normalized,
            self.fingerprint_prefix_chars,
        );

        if let Some(vector) = self.cache.get(&key) {
            return Ok(Some(vector));
        }

        let vector = self
            .retry
            .run(|| self.provider.embed(&normalized))
            .await?;

        if vector.is_empty() || (self.dimensions > 0 && vector.len() != self.dimensions) {
            tracing::warn!(
                "Provider '{}' returned unusable vector (len {}, expected {})",
                self.provider.name(),
                vector.len(),
                self.dimensions
            );
            return Ok(None);
        }

        self.cache.put(key, vector.clone());
        Ok(Some(vector))
    }

    /// Embed many texts concurrently and independently
    ///
    /// One item's failure never blocks or fails the others; result positions
    /// correspond to input positions, with failures collapsed to `None`.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let futures: Vec<_> = texts.iter().map(|text| self.embed(text)).collect();

        join_all(futures)
            .await
            .into_iter()
            .map(|result| match result {
                Ok(vector) => vector,
                Err(e) => {
                    tracing::warn!("Batch embedding item failed: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Number of cached vectors (diagnostics)
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
