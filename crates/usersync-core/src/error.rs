//! Error types for the usersync core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Only [`Error::Config`] and startup failures are fatal; everything raised
//! while handling a single message is logged and the message is consumed.

use thiserror::Error;

/// Result type alias for usersync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for usersync.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka-related error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Column store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Message content error
    #[error("User error: {0}")]
    User(#[from] UserError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kafka-specific errors.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Failed to connect to broker
    #[error("Connection failed to {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Topic metadata could not be fetched
    #[error("Metadata fetch failed for topic {topic}: {message}")]
    Metadata { topic: String, message: String },

    /// Configured partition is not served by the topic
    #[error("Partition {partition} not found for topic {topic}")]
    PartitionNotFound { topic: String, partition: i32 },

    /// Partition assignment error
    #[error("Partition assignment error: {0}")]
    Assignment(String),

    /// Committed offset lookup failed
    #[error("Offset fetch failed: {0}")]
    OffsetFetch(String),

    /// Offset commit failed
    #[error("Offset commit failed: {0}")]
    OffsetCommit(String),

    /// Error surfaced by the message stream
    #[error("Consume error: {0}")]
    Consume(String),
}

/// Column store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Session could not be established
    #[error("Connection failed to {peers}: {message}")]
    Connection { peers: String, message: String },

    /// Statement execution failed
    #[error("Statement execution failed: {0}")]
    Execution(String),

    /// Unknown consistency level name
    #[error("Invalid consistency level: {0}")]
    InvalidConsistency(String),

    /// Native protocol version the driver cannot speak
    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocol(u8),
}

/// Errors in the content of a single message.
#[derive(Error, Debug, PartialEq)]
pub enum UserError {
    /// Payload is not a valid envelope
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Required fields are missing
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A present numeric field does not parse
    #[error("Malformed number in field {field}: {value:?}")]
    MalformedNumber { field: &'static str, value: String },

    /// Keyed write without a login
    #[error("Missing login")]
    MissingLogin,
}

// Conversion implementations for external error types

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
