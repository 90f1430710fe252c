//! usersync core - Kafka user lifecycle consumer for Cassandra
//!
//! This library consumes user create, update and remove messages from a
//! single Kafka partition and persists them into a Cassandra/Scylla user
//! table with:
//!
//! - Partial updates that write only the fields a message carries
//! - Soft-delete through the `Removed` state flag
//! - One offset checkpoint per message, whatever its outcome
//! - Deterministic draining of queued messages on shutdown

pub mod config;
pub mod engine;
pub mod error;
pub mod kafka;
pub mod model;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use engine::{IngestionEngine, PipelineStats};
pub use error::{Error, Result};
pub use error::{KafkaError, StoreError, UserError};
