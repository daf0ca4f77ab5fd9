//! Second-pass relevance scoring through a cross-encoder collaborator

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Pairwise relevance model: `score(query, passage) -> [0, 1]`
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Score one query/passage pair
    async fn score(&self, query: &str, passage: &str) -> Result<f32>;

    /// Provider name for diagnostics
    fn name(&self) -> &str;
}

/// HTTP cross-encoder endpoint
pub struct HttpReranker {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    passage: &'a str,
}

#[derive(Deserialize)]
struct RerankResponse {
    score: f32,
}

impl HttpReranker {
    /// Create a reranker client against the given endpoint
    pub fn new(url: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RerankProvider for HttpReranker {
    async fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let response = self
            .client
            .post(&self.url)
            .json(&RerankRequest { query, passage })
            .send()
            .await
            .map_err(|e| Error::Rerank(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Rerank(format!("HTTP {}", response.status())));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| Error::Rerank(format!("bad response: {}", e)))?;

        Ok(parsed.score.clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        "http-cross-encoder"
    }
}
