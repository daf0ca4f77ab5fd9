//! Background processing: ingest queue and worker pool

pub mod queue;
pub mod worker;

pub use queue::{IngestJob, IngestQueue, SubmitOutcome};
pub use worker::IngestWorker;
