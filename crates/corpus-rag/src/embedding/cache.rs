//! Embedding cache keyed by content fingerprint
//!
//! Purely a latency optimization: absence or eviction never changes
//! correctness, and fingerprint collisions are indistinguishable by design.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A cached embedding vector
#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

/// Bounded TTL + LRU cache for embedding vectors
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl_seconds: u64,
}

impl EmbeddingCache {
    /// Create a new cache
    pub fn new(max_entries: usize, ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl_seconds,
        }
    }

    /// Best-effort fingerprint: sha256 over the model id and a prefix of the
    /// normalized text. Not cryptographic; collisions are tolerated.
    pub fn fingerprint(model: &str, normalized_text: &str, prefix_chars: usize) -> String {
        let prefix: String = normalized_text.chars().take(prefix_chars).collect();
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(prefix.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a vector, refreshing its LRU position
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get_mut(key) {
            let age = Utc::now().signed_duration_since(entry.inserted_at);
            if age.num_seconds() as u64 > self.ttl_seconds {
                tracing::debug!("Embedding cache miss (TTL expired): {}", &key[..12]);
                entries.remove(key);
                return None;
            }
            entry.last_accessed = Utc::now();
            tracing::debug!("Embedding cache hit: {}", &key[..12]);
            return Some(entry.vector.clone());
        }

        None
    }

    /// Insert a vector; idempotent upsert, last write wins
    pub fn put(&self, key: String, vector: Vec<f32>) {
        let mut entries = self.entries.write();

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            // Evict the least recently used entry
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, v)| v.last_accessed)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&lru_key);
            }
        }

        let now = Utc::now();
        entries.insert(
            key,
            CacheEntry {
                vector,
                inserted_at: now,
                last_accessed: now,
            },
        );
    }

    /// Current entry count
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_on_model_and_prefix() {
        let a = EmbeddingCache::fingerprint("model-a", "hello world", 512);
        let b = EmbeddingCache::fingerprint("model-b", "hello world", 512);
        let c = EmbeddingCache::fingerprint("model-a", "hello world", 512);
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn fingerprint_ignores_text_past_the_prefix() {
        let base = "x".repeat(512);
        let a = EmbeddingCache::fingerprint("m", &format!("{}tail-one", base), 512);
        let b = EmbeddingCache::fingerprint("m", &format!("{}tail-two", base), 512);
        assert_eq!(a, b);
    }

    #[test]
    fn put_get_roundtrip() {
        let cache = EmbeddingCache::new(10, 3600);
        cache.put("key-0000000000".to_string(), vec![0.1, 0.2]);
        assert_eq!(cache.get("key-0000000000"), Some(vec![0.1, 0.2]));
        assert_eq!(cache.get("missing-000000"), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2, 3600);
        cache.put("aaaaaaaaaaaaaa".to_string(), vec![1.0]);
        cache.put("bbbbbbbbbbbbbb".to_string(), vec![2.0]);
        // Touch "a" so "b" becomes the LRU entry
        assert!(cache.get("aaaaaaaaaaaaaa").is_some());
        cache.put("cccccccccccccc".to_string(), vec![3.0]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("aaaaaaaaaaaaaa").is_some());
        assert!(cache.get("bbbbbbbbbbbbbb").is_none());
        assert!(cache.get("cccccccccccccc").is_some());
    }

    #[test]
    fn ttl_expiry_is_a_miss() {
        let cache = EmbeddingCache::new(10, 0);
        cache.put("kkkkkkkkkkkkkk".to_string(), vec![1.0]);
        std::thread::sleep(std::time::Duration::from_millis(1_100));
        assert!(cache.get("kkkkkkkkkkkkkk").is_none());
    }
}
