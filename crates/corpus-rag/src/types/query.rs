//! Request types for the HTTP surface

use serde::{Deserialize, Serialize};

/// POST /api/search request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Natural-language query
    pub query: String,
    /// Number of passages to return
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// POST /api/crawl request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Page URL to fetch and ingest
    pub url: String,
}
