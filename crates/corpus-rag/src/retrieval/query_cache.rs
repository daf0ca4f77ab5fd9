//! Short-TTL cache for whole query results

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::types::RankedPassage;

#[derive(Debug, Clone)]
struct CacheEntry {
    passages: Vec<RankedPassage>,
    cached_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

/// Bounded TTL + LRU cache keyed by (query, top_k)
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl_seconds: u64,
}

impl QueryCache {
    /// Create a new cache
    pub fn new(max_entries: usize, ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl_seconds,
        }
    }

    fn key(query: &str, top_k: usize) -> String {
        let normalized = query.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0u8]);
        hasher.update(top_k.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a cached result
    pub fn get(&self, query: &str, top_k: usize) -> Option<Vec<RankedPassage>> {
        let key = Self::key(query, top_k);
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get_mut(&key) {
            let age = Utc::now().signed_duration_since(entry.cached_at);
            if age.num_seconds() as u64 > self.ttl_seconds {
                entries.remove(&key);
                return None;
            }
            entry.last_accessed = Utc::now();
            tracing::debug!("Query cache hit: {}", &key[..12]);
            return Some(entry.passages.clone());
        }

        None
    }

    /// Store a result; idempotent upsert, last write wins
    pub fn put(&self, query: &str, top_k: usize, passages: Vec<RankedPassage>) {
        let key = Self::key(query, top_k);
        let mut entries = self.entries.write();

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
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
                passages,
                cached_at: now,
                last_accessed: now,
            },
        );
    }

    /// Drop everything (e.g. after a document deletion)
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_distinguishes_top_k() {
        assert_ne!(QueryCache::key("q", 5), QueryCache::key("q", 10));
        assert_eq!(QueryCache::key("  Q ", 5), QueryCache::key("q", 5));
    }

    #[test]
    fn roundtrip_and_clear() {
        let cache = QueryCache::new(10, 60);
        cache.put("query", 5, Vec::new());
        assert!(cache.get("query", 5).is_some());
        assert!(cache.get("query", 6).is_none());

        cache.clear();
        assert!(cache.get("query", 5).is_none());
    }
}
