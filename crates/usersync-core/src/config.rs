//! Configuration structures for usersync.
//!
//! Configuration is loaded from an optional TOML file and overridden by
//! environment variables and CLI flags. It is built once at startup and
//! passed into the engine by value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Kafka configuration
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// Column store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Processing pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Kafka consumer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    #[serde(default)]
    pub brokers: Vec<String>,

    /// Topic to consume from
    #[serde(default)]
    pub topic: String,

    /// Partitions the topic is expected to serve
    #[serde(default)]
    pub partitions: PartitionSelection,

    /// Partition this pipeline consumes
    #[serde(default)]
    pub partition: i32,

    /// Consumer group ID owning the checkpoints
    #[serde(default)]
    pub consumer_group: String,

    /// Where to start when the group has never committed
    #[serde(default)]
    pub offset: OffsetPolicy,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,

    /// Timeout for metadata and committed-offset lookups
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,

    /// Enable librdkafka debug logging
    #[serde(default)]
    pub verbose: bool,

    /// Security configuration
    #[serde(default)]
    pub security: KafkaSecurityConfig,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topic: String::new(),
            partitions: PartitionSelection::default(),
            partition: 0,
            consumer_group: String::new(),
            offset: OffsetPolicy::default(),
            session_timeout_ms: default_session_timeout_ms(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
            verbose: false,
            security: KafkaSecurityConfig::default(),
        }
    }
}

/// Starting position used when no checkpoint exists.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OffsetPolicy {
    /// Lowest offset still available
    Oldest,
    /// Next offset to be produced
    #[default]
    Newest,
}

impl FromStr for OffsetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest" => Ok(OffsetPolicy::Oldest),
            "newest" => Ok(OffsetPolicy::Newest),
            other => Err(format!(
                "offset should be `oldest` or `newest`, got `{}`",
                other
            )),
        }
    }
}

impl fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetPolicy::Oldest => f.write_str("oldest"),
            OffsetPolicy::Newest => f.write_str("newest"),
        }
    }
}

/// Partitions of the topic: discovered from the broker or listed explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum PartitionSelection {
    /// Ask the broker
    #[default]
    All,
    /// Comma-separated list
    List(Vec<i32>),
}

impl FromStr for PartitionSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "all" {
            return Ok(PartitionSelection::All);
        }
        s.split(',')
            .map(|p| {
                p.trim()
                    .parse::<i32>()
                    .map_err(|e| format!("invalid partition `{}`: {}", p.trim(), e))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(PartitionSelection::List)
    }
}

impl TryFrom<String> for PartitionSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartitionSelection> for String {
    fn from(value: PartitionSelection) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PartitionSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionSelection::All => f.write_str("all"),
            PartitionSelection::List(ids) => {
                let ids: Vec<String> = ids.iter().map(i32::to_string).collect();
                f.write_str(&ids.join(","))
            }
        }
    }
}

/// Kafka security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KafkaSecurityConfig {
    /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT)
    pub protocol: Option<String>,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    pub sasl_mechanism: Option<String>,

    /// SASL username
    pub sasl_username: Option<String>,

    /// SASL password
    pub sasl_password: Option<String>,

    /// SSL CA certificate location
    pub ssl_ca_location: Option<PathBuf>,

    /// SSL client certificate location
    pub ssl_cert_location: Option<PathBuf>,

    /// SSL client key location
    pub ssl_key_location: Option<PathBuf>,
}

/// Column store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Contact points (`host` or `host:port`)
    #[serde(default)]
    pub peers: Vec<String>,

    /// Keyspace holding the user table
    #[serde(default)]
    pub keyspace: String,

    /// User table name
    #[serde(default = "default_table")]
    pub table: String,

    /// Consistency level name
    #[serde(default = "default_consistency")]
    pub consistency: String,

    /// Native protocol version
    #[serde(default)]
    pub protocol_version: Option<u8>,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            keyspace: String::new(),
            table: default_table(),
            consistency: default_consistency(),
            protocol_version: None,
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

/// Processing pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Capacity of the queue between delivery and processing
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Lifecycle action applied to every message
    #[serde(default)]
    pub action: Action,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            action: Action::default(),
        }
    }
}

/// Lifecycle action a pipeline applies.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Insert new accounts
    #[default]
    Create,
    /// Partially update existing accounts
    Update,
    /// Soft-delete accounts
    Remove,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "remove" => Ok(Action::Remove),
            other => Err(format!(
                "action should be `create`, `update` or `remove`, got `{}`",
                other
            )),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => f.write_str("create"),
            Action::Update => f.write_str("update"),
            Action::Remove => f.write_str("remove"),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by tracing's `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_session_timeout_ms() -> u32 {
    30000
}
fn default_metadata_timeout_ms() -> u64 {
    10000
}
fn default_table() -> String {
    "user".to_string()
}
fn default_consistency() -> String {
    "ONE".to_string()
}
fn default_connection_timeout_ms() -> u64 {
    600
}
fn default_buffer_size() -> usize {
    1
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// The result is not validated; flags may still fill in required fields.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.kafka.brokers.is_empty() {
            return Err(crate::Error::Config(
                "You have to provide brokers as a comma-separated list, or set the KAFKA_PEERS environment variable".into(),
            ));
        }

        if self.kafka.topic.is_empty() {
            return Err(crate::Error::Config("Kafka topic is required".into()));
        }

        if self.kafka.consumer_group.is_empty() {
            return Err(crate::Error::Config("Consumer group is required".into()));
        }

        if let PartitionSelection::List(ids) = &self.kafka.partitions {
            if !ids.contains(&self.kafka.partition) {
                return Err(crate::Error::Config(format!(
                    "Partition {} is not in the partition list {}",
                    self.kafka.partition, self.kafka.partitions
                )));
            }
        }

        if self.store.peers.is_empty() {
            return Err(crate::Error::Config(
                "At least one store peer required".into(),
            ));
        }

        if self.store.keyspace.is_empty() {
            return Err(crate::Error::Config("Store keyspace is required".into()));
        }

        if !is_identifier(&self.store.table) {
            return Err(crate::Error::Config(format!(
                "Invalid table name `{}`",
                self.store.table
            )));
        }

        if self.pipeline.buffer_size == 0 {
            return Err(crate::Error::Config(
                "Buffer size must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
