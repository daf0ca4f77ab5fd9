//! Text chunking: splits extracted text into bounded, ordered passages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::Chunk;

/// Chunking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Sliding character window with overlap
    Fixed,
    /// Accumulate blank-line-delimited paragraphs up to a soft size limit
    Paragraph,
    /// Accumulate sentences up to a soft size limit
    Sentence,
}

/// Size limits for chunking
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    /// Window size in characters (fixed strategy)
    pub chunk_size: usize,
    /// Window overlap in characters (fixed strategy)
    pub chunk_overlap: usize,
    /// Soft upper bound for accumulation strategies
    pub max_chunk_size: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 200,
            max_chunk_size: 1500,
        }
    }
}

/// An ordered passage produced by the chunker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based, contiguous position
    pub index: u32,
    /// Passage text
    pub text: String,
}

/// Text chunker with a configurable strategy
pub struct Chunker {
    strategy: ChunkStrategy,
    limits: ChunkLimits,
}

impl Chunker {
    /// Create a new chunker
    pub fn new(strategy: ChunkStrategy, limits: ChunkLimits) -> Self {
        Self { strategy, limits }
    }

    /// Split `text` into ordered passages
    ///
    /// Empty or whitespace-only input yields no chunks. Input that fits the
    /// size limit yields exactly one chunk.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let pieces = match self.strategy {
            ChunkStrategy::Fixed => self.chunk_fixed(text),
            ChunkStrategy::Paragraph => accumulate(split_paragraphs(text), "\n\n", self.limits.max_chunk_size),
            ChunkStrategy::Sentence => accumulate(split_sentences(text), " ", self.limits.max_chunk_size),
        };

        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| TextChunk { index: i as u32, text })
            .collect()
    }

    /// Sliding window of `chunk_size` characters with `chunk_overlap` overlap.
    /// Overlap >= size is ignored so the window always advances.
    fn chunk_fixed(&self, text: &str) -> Vec<String> {
        let size = self.limits.chunk_size.max(1);
        let overlap = if self.limits.chunk_overlap >= size {
            tracing::warn!(
                "chunk_overlap {} >= chunk_size {}, ignoring overlap",
                self.limits.chunk_overlap,
                size
            );
            0
        } else {
            self.limits.chunk_overlap
        };
        let step = size - overlap;

        let chars: Vec<char> = text.chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0usize;

        while start < chars.len() {
            let end = (start + size).min(chars.len());
            pieces.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        pieces
    }
}

/// Merge `metadata` into every chunk, last write wins per key
pub fn add_metadata(chunks: &mut [Chunk], metadata: &HashMap<String, serde_json::Value>) {
    for chunk in chunks.iter_mut() {
        for (key, value) in metadata {
            chunk.metadata.insert(key.clone(), value.clone());
        }
    }
}

/// Accumulate units into pieces no larger than `max_size`.
/// A single unit longer than the limit is kept intact (soft limit).
fn accumulate(units: Vec<String>, joiner: &str, max_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for unit in units {
        if current.is_empty() {
            current = unit;
            continue;
        }
        if current.chars().count() + joiner.chars().count() + unit.chars().count() > max_size {
            pieces.push(std::mem::take(&mut current));
            current = unit;
        } else {
            current.push_str(joiner);
            current.push_str(&unit);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Split into blank-line-delimited paragraphs
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                paragraphs.push(current.trim().to_string());
            }
            current.clear();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    paragraphs
}

/// Split at `.`/`!`/`?` followed by whitespace
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if chars.peek().map_or(true, |next| next.is_whitespace()) {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
                // Consume the boundary whitespace
                while chars.peek().is_some_and(|next| next.is_whitespace()) {
                    chars.next();
                }
            }
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn limits(size: usize, overlap: usize, max: usize) -> ChunkLimits {
        ChunkLimits {
            chunk_size: size,
            chunk_overlap: overlap,
            max_chunk_size: max,
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        for strategy in [ChunkStrategy::Fixed, ChunkStrategy::Paragraph, ChunkStrategy::Sentence] {
            let chunker = Chunker::new(strategy, ChunkLimits::default());
            assert!(chunker.chunk("").is_empty());
            assert!(chunker.chunk("   \n\t  ").is_empty());
        }
    }

    #[test]
    fn short_input_yields_one_chunk() {
        for strategy in [ChunkStrategy::Fixed, ChunkStrategy::Paragraph, ChunkStrategy::Sentence] {
            let chunker = Chunker::new(strategy, ChunkLimits::default());
            let chunks = chunker.chunk("A short note.");
            assert_eq!(chunks.len(), 1, "strategy {:?}", strategy);
            assert_eq!(chunks[0].index, 0);
        }
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let chunker = Chunker::new(ChunkStrategy::Fixed, limits(10, 0, 10));
        let chunks = chunker.chunk(&"x".repeat(95));
        assert_eq!(chunks.len(), 10);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u32);
        }
    }

    #[test]
    fn fixed_window_covers_all_content() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunker = Chunker::new(ChunkStrategy::Fixed, limits(10, 3, 10));
        let chunks = chunker.chunk(text);

        // Every character of the input appears in order in the concatenation
        let mut covered = String::new();
        let step = 10 - 3;
        for (i, chunk) in chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { 10 - step };
            covered.extend(chunk.text.chars().skip(skip));
        }
        assert_eq!(covered, text);
    }

    #[test]
    fn fixed_overlap_ge_size_still_advances() {
        let chunker = Chunker::new(ChunkStrategy::Fixed, limits(5, 5, 5));
        let chunks = chunker.chunk(&"y".repeat(23));
        // Overlap ignored: plain 5-char windows
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[4].text.len(), 3);
    }

    #[test]
    fn paragraphs_accumulate_until_limit() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunker = Chunker::new(ChunkStrategy::Paragraph, limits(1024, 0, 30));
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 3);

        // A larger limit packs two paragraphs per chunk
        let chunker = Chunker::new(ChunkStrategy::Paragraph, limits(1024, 0, 46));
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("First"));
        assert!(chunks[0].text.contains("Second"));
    }

    #[test]
    fn oversized_paragraph_kept_intact() {
        let big = "word ".repeat(100);
        let text = format!("{}\n\nsmall one", big.trim());
        let chunker = Chunker::new(ChunkStrategy::Paragraph, limits(1024, 0, 50));
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, big.trim());
    }

    #[test]
    fn sentences_split_on_terminators_before_whitespace() {
        let text = "Is this real? Yes! Version 2.5 shipped. Done.";
        let chunker = Chunker::new(ChunkStrategy::Sentence, limits(1024, 0, 10));
        let chunks = chunker.chunk(text);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        // "2.5" must not split: the period is not followed by whitespace
        assert_eq!(
            texts,
            vec!["Is this real?", "Yes!", "Version 2.5 shipped.", "Done."]
        );
    }

    #[test]
    fn concatenation_covers_content_modulo_whitespace() {
        let text = "Alpha beta gamma. Delta epsilon!  Zeta eta theta?\n\nIota kappa.";
        for strategy in [ChunkStrategy::Fixed, ChunkStrategy::Paragraph, ChunkStrategy::Sentence] {
            let chunker = Chunker::new(strategy, limits(20, 0, 20));
            let chunks = chunker.chunk(text);
            // Zero-overlap fixed windows concatenate exactly; accumulation
            // strategies re-join with whitespace
            let joiner = if strategy == ChunkStrategy::Fixed { "" } else { " " };
            let joined: String = chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(joiner);
            let normalize =
                |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
            assert_eq!(normalize(&joined), normalize(text), "strategy {:?}", strategy);
        }
    }

    #[test]
    fn add_metadata_is_last_write_wins() {
        let doc_id = Uuid::new_v4();
        let mut chunks = vec![Chunk::new(doc_id, 0, "a".into()), Chunk::new(doc_id, 1, "b".into())];
        chunks[0]
            .metadata
            .insert("source".into(), serde_json::json!("old.txt"));
        chunks[0]
            .metadata
            .insert("pages".into(), serde_json::json!(3));

        let mut incoming = HashMap::new();
        incoming.insert("source".into(), serde_json::json!("new.txt"));
        incoming.insert("lang".into(), serde_json::json!("en"));
        add_metadata(&mut chunks, &incoming);

        // Overwritten by the incoming key
        assert_eq!(chunks[0].metadata["source"], serde_json::json!("new.txt"));
        // Preserved: not present in the incoming map
        assert_eq!(chunks[0].metadata["pages"], serde_json::json!(3));
        // Applied to every chunk
        assert_eq!(chunks[1].metadata["lang"], serde_json::json!("en"));
    }
}
