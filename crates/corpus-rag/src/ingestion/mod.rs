//! Document ingestion: extraction and the status-machine pipeline

pub mod extract;
pub mod pipeline;

pub use extract::{DefaultExtractor, ExtractedText, RawSource, TextExtractor};
pub use pipeline::IngestionPipeline;
