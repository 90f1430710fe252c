//! Consumption engine.

mod ingestion;
mod pipeline;
mod processor;

pub use ingestion::IngestionEngine;
pub use pipeline::{Pipeline, PipelineState, PipelineStats};
pub use processor::{MessageProcessor, Outcome, Processed};
