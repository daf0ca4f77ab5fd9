//! Text extraction collaborator
//!
//! Extraction is an external concern; the engine depends only on the
//! [`TextExtractor`] contract. The default implementation handles plain
//! text, HTML, and URL fetches; anything richer belongs behind the same
//! trait.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Node};
use std::time::Duration;

use crate::error::{Error, Result};

/// Raw content handed to the ingestion pipeline
#[derive(Debug, Clone)]
pub enum RawSource {
    /// Uploaded file bytes
    FileBytes { name: String, data: Vec<u8> },
    /// Web page to fetch
    Url { url: String },
}

impl RawSource {
    /// Display name of the source
    pub fn name(&self) -> &str {
        match self {
            Self::FileBytes { name, .. } => name,
            Self::Url { url } => url,
        }
    }

    /// Raw size in bytes (0 for not-yet-fetched URLs)
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::FileBytes { data, .. } => data.len() as u64,
            Self::Url { .. } => 0,
        }
    }
}

/// Extraction output
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Plain text content
    pub text: String,
    /// Whitespace-delimited word count
    pub word_count: usize,
    /// Page count when the source format has pages
    pub page_count: Option<u32>,
}

/// Contract for turning a raw source into plain text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text; raises a typed extraction error on unsupported
    /// formats or unreachable sources.
    async fn extract(&self, source: &RawSource) -> Result<ExtractedText>;
}

/// Default extractor: plain text, HTML, and URL fetches
pub struct DefaultExtractor {
    client: Client,
}

impl DefaultExtractor {
    /// Create a new extractor
    pub fn new(fetch_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(fetch_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TextExtractor for DefaultExtractor {
    async fn extract(&self, source: &RawSource) -> Result<ExtractedText> {
        match source {
            RawSource::FileBytes { name, data } => extract_file(name, data),
            RawSource::Url { url } => self.extract_url(url).await,
        }
    }
}

impl DefaultExtractor {
    async fn extract_url(&self, url: &str) -> Result<ExtractedText> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::extraction(url, format!("unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::extraction(url, format!("HTTP {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| Error::extraction(url, format!("failed to read body: {}", e)))?;

        let text = if content_type.contains("text/html") || looks_like_html(&body) {
            html_to_text(&body)
        } else {
            body
        };

        Ok(finish(text, None))
    }
}

fn extract_file(name: &str, data: &[u8]) -> Result<ExtractedText> {
    if is_probably_binary(data) {
        return Err(Error::extraction(name, "unsupported binary format"));
    }

    let content = String::from_utf8_lossy(data).into_owned();
    let lower = name.to_lowercase();

    let text = if lower.ends_with(".html") || lower.ends_with(".htm") || looks_like_html(&content) {
        html_to_text(&content)
    } else {
        content
    };

    Ok(finish(text, None))
}

fn finish(text: String, page_count: Option<u32>) -> ExtractedText {
    let word_count = text.split_whitespace().count();
    ExtractedText {
        text,
        word_count,
        page_count,
    }
}

/// Heuristic binary sniff: NUL bytes in the head mean "not text"
fn is_probably_binary(data: &[u8]) -> bool {
    data.iter().take(4096).any(|&b| b == 0)
}

fn looks_like_html(content: &str) -> bool {
    let head = content.trim_start().get(..256).unwrap_or(content.trim_start());
    let head = head.to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<body")
}

/// Strip markup, keeping visible text nodes only
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();

    for node in document.tree.nodes() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
                Node::Element(el) => {
                    matches!(el.name(), "script" | "style" | "noscript" | "head" | "template")
                }
                _ => false,
            });
            if hidden {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_passes_through() {
        let extractor = DefaultExtractor::new(5).unwrap();
        let source = RawSource::FileBytes {
            name: "notes.txt".to_string(),
            data: b"hello world, twice over".to_vec(),
        };
        let extracted = extractor.extract(&source).await.unwrap();
        assert_eq!(extracted.text, "hello world, twice over");
        assert_eq!(extracted.word_count, 4);
    }

    #[tokio::test]
    async fn html_markup_is_stripped() {
        let extractor = DefaultExtractor::new(5).unwrap();
        let html = r#"<!DOCTYPE html>
            <html><head><title>skip me</title><style>p { color: red }</style></head>
            <body><h1>Heading</h1><p>Body text.</p><script>var x = 1;</script></body></html>"#;
        let source = RawSource::FileBytes {
            name: "page.html".to_string(),
            data: html.as_bytes().to_vec(),
        };
        let extracted = extractor.extract(&source).await.unwrap();
        assert!(extracted.text.contains("Heading"));
        assert!(extracted.text.contains("Body text."));
        assert!(!extracted.text.contains("color: red"));
        assert!(!extracted.text.contains("var x"));
    }

    #[tokio::test]
    async fn binary_input_is_a_typed_extraction_error() {
        let extractor = DefaultExtractor::new(5).unwrap();
        let source = RawSource::FileBytes {
            name: "image.png".to_string(),
            data: vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0x00, 0x01],
        };
        let err = extractor.extract(&source).await.unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }
}
