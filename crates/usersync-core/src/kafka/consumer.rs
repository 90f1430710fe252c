//! Single-partition Kafka consumer with exponential backoff.
//!
//! The consumer is manually assigned to one partition at an explicit start
//! offset; there is no group subscription and no rebalancing. The group id
//! only scopes committed offsets. Auto-commit is disabled: offsets are
//! committed by the checkpoint manager after each message is handled.
//!
//! ## Exponential Backoff
//!
//! Consume errors are retried by the pipeline with:
//! min(max_delay, base_delay * 2^attempt) + jitter

use super::checkpoint::{CheckpointKey, CommittedOffset, OffsetStore, StartOffset};
use super::message::KafkaMessage;
use super::source::MessageSource;
use crate::config::{KafkaConfig, PartitionSelection};
use crate::{Error, KafkaError, Result};
use async_trait::async_trait;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// librdkafka debug contexts enabled by the verbose toggle.
const DEBUG_CONTEXTS: &str = "consumer,cgrp,topic,fetch";

/// Configuration for exponential backoff retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay for first retry (default: 100ms)
    pub base_delay: Duration,
    /// Maximum delay cap (default: 30s)
    pub max_delay: Duration,
    /// Consecutive failures before escalating the log level (default: 10)
    pub max_retries: u32,
    /// Whether to add jitter (randomness) to delays (default: true)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            max_retries: 10,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            jitter: true,
        }
    }

    /// Disable jitter (for testing).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculate the backoff delay for a given attempt.
    ///
    /// Uses exponential backoff: min(max_delay, base_delay * 2^attempt)
    /// Optionally adds jitter (±25%) to prevent thundering herd.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_delay_ms = delay_ms.min(max_ms);

        let final_delay_ms = if self.jitter {
            let jitter_range = capped_delay_ms / 4;
            let jitter = (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64)
                % (jitter_range * 2 + 1);
            capped_delay_ms.saturating_sub(jitter_range) + jitter
        } else {
            capped_delay_ms
        };

        Duration::from_millis(final_delay_ms)
    }

    /// Whether `failures` consecutive errors are still within budget.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }
}

/// Builder for the partition consumer.
pub struct PartitionConsumerBuilder {
    config: KafkaConfig,
}

impl PartitionConsumerBuilder {
    /// Create a new consumer builder.
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", self.config.brokers.join(","))
            .set("group.id", &self.config.consumer_group)
            // Offsets are committed by the checkpoint manager only
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set(
                "session.timeout.ms",
                self.config.session_timeout_ms.to_string(),
            )
            .set("enable.partition.eof", "false");

        if self.config.verbose {
            client_config
                .set("debug", DEBUG_CONTEXTS)
                .set_log_level(RDKafkaLogLevel::Debug);
        }

        // Security configuration
        if let Some(ref protocol) = self.config.security.protocol {
            client_config.set("security.protocol", protocol);
        }
        if let Some(ref mechanism) = self.config.security.sasl_mechanism {
            client_config.set("sasl.mechanism", mechanism);
        }
        if let Some(ref username) = self.config.security.sasl_username {
            client_config.set("sasl.username", username);
        }
        if let Some(ref password) = self.config.security.sasl_password {
            client_config.set("sasl.password", password);
        }
        if let Some(ref path) = self.config.security.ssl_ca_location {
            client_config.set("ssl.ca.location", path.to_string_lossy().as_ref());
        }
        if let Some(ref path) = self.config.security.ssl_cert_location {
            client_config.set("ssl.certificate.location", path.to_string_lossy().as_ref());
        }
        if let Some(ref path) = self.config.security.ssl_key_location {
            client_config.set("ssl.key.location", path.to_string_lossy().as_ref());
        }

        client_config
    }

    /// Build the consumer. Nothing is assigned until [`MessageSource::start`].
    pub fn build(self) -> Result<PartitionConsumer> {
        let consumer: StreamConsumer = self.client_config().create().map_err(|e| {
            Error::Kafka(KafkaError::ConnectionFailed {
                broker: self.config.brokers.join(","),
                message: e.to_string(),
            })
        })?;

        info!(
            topic = %self.config.topic,
            partition = self.config.partition,
            group = %self.config.consumer_group,
            brokers = %self.config.brokers.join(","),
            verbose = self.config.verbose,
            "Kafka consumer created"
        );

        Ok(PartitionConsumer {
            consumer: Arc::new(consumer),
            topic: self.config.topic,
            group: self.config.consumer_group,
            partition: self.config.partition,
            metadata_timeout: Duration::from_millis(self.config.metadata_timeout_ms),
        })
    }
}

/// Kafka consumer bound to one partition of one topic.
pub struct PartitionConsumer {
    consumer: Arc<StreamConsumer>,
    topic: String,
    group: String,
    partition: i32,
    metadata_timeout: Duration,
}

impl PartitionConsumer {
    /// Get the topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Checkpoint identity of this consumer.
    pub fn checkpoint_key(&self) -> CheckpointKey {
        CheckpointKey::new(&self.group, &self.topic, self.partition)
    }

    /// Offset store sharing this consumer's client.
    pub fn offset_store(&self) -> KafkaOffsetStore {
        KafkaOffsetStore {
            consumer: self.consumer.clone(),
            timeout: self.metadata_timeout,
        }
    }

    /// Partition ids of the topic: the explicit list, or broker metadata.
    pub async fn discover_partitions(&self, selection: &PartitionSelection) -> Result<Vec<i32>> {
        if let PartitionSelection::List(ids) = selection {
            return Ok(ids.clone());
        }

        let consumer = self.consumer.clone();
        let topic = self.topic.clone();
        let timeout = self.metadata_timeout;

        tokio::task::spawn_blocking(move || -> Result<Vec<i32>> {
            let metadata_error = |message: String| {
                Error::Kafka(KafkaError::Metadata {
                    topic: topic.clone(),
                    message,
                })
            };

            let metadata = consumer
                .fetch_metadata(Some(&topic), timeout)
                .map_err(|e| metadata_error(e.to_string()))?;

            let entry = metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic)
                .ok_or_else(|| metadata_error("topic not in metadata".into()))?;

            if let Some(err) = entry.error() {
                return Err(metadata_error(format!("{:?}", err)));
            }

            Ok(entry.partitions().iter().map(|p| p.id()).collect())
        })
        .await
        .map_err(|e| Error::Kafka(KafkaError::Metadata {
            topic: self.topic.clone(),
            message: format!("Failed to join task: {}", e),
        }))?
    }

    /// Fail unless the configured partition is among `available`.
    pub fn ensure_partition(&self, available: &[i32]) -> Result<()> {
        for id in available {
            info!(topic = %self.topic, partition = id, "Discovered partition");
        }

        if available.contains(&self.partition) {
            Ok(())
        } else {
            Err(Error::Kafka(KafkaError::PartitionNotFound {
                topic: self.topic.clone(),
                partition: self.partition,
            }))
        }
    }

    /// Low and high watermarks of the assigned partition.
    pub async fn watermarks(&self) -> Result<(i64, i64)> {
        let consumer = self.consumer.clone();
        let topic = self.topic.clone();
        let partition = self.partition;
        let timeout = self.metadata_timeout;

        tokio::task::spawn_blocking(move || {
            consumer
                .fetch_watermarks(&topic, partition, timeout)
                .map_err(|e| Error::Kafka(KafkaError::Metadata {
                    topic,
                    message: e.to_string(),
                }))
        })
        .await
        .map_err(|e| Error::Kafka(KafkaError::Metadata {
            topic: self.topic.clone(),
            message: format!("Failed to join task: {}", e),
        }))?
    }

    /// Convert a borrowed message to an owned KafkaMessage.
    fn convert_message(msg: &BorrowedMessage) -> KafkaMessage {
        KafkaMessage {
            key: msg.key().map(|k| k.to_vec()),
            value: msg.payload().map(|v| v.to_vec()),
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            timestamp: msg.timestamp().to_millis().unwrap_or(0),
            headers: Self::extract_headers(msg),
        }
    }

    /// Extract headers from a message.
    fn extract_headers(msg: &BorrowedMessage) -> Vec<(String, Vec<u8>)> {
        msg.headers()
            .map(|headers| {
                (0..headers.count())
                    .map(|i| {
                        let header = headers.get(i);
                        (header.key.to_string(), header.value.unwrap_or(&[]).to_vec())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn to_rdkafka_offset(start: StartOffset) -> Offset {
    match start {
        StartOffset::Oldest => Offset::Beginning,
        StartOffset::Newest => Offset::End,
        StartOffset::At(offset) => Offset::Offset(offset),
    }
}

#[async_trait]
impl MessageSource for PartitionConsumer {
    async fn start(&self, start: StartOffset) -> Result<()> {
        match self.watermarks().await {
            Ok((low, high)) => info!(
                topic = %self.topic,
                partition = self.partition,
                low,
                high,
                "Partition watermarks"
            ),
            Err(e) => debug!(error = %e, "Watermarks unavailable"),
        }

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, to_rdkafka_offset(start))
            .map_err(|e| Error::Kafka(KafkaError::Assignment(e.to_string())))?;

        self.consumer
            .assign(&tpl)
            .map_err(|e| Error::Kafka(KafkaError::Assignment(e.to_string())))?;

        info!(
            topic = %self.topic,
            partition = self.partition,
            start = %start,
            "Partition assigned"
        );
        Ok(())
    }

    async fn recv(&self) -> Option<Result<KafkaMessage>> {
        match self.consumer.recv().await {
            Ok(msg) => Some(Ok(Self::convert_message(&msg))),
            Err(e) => Some(Err(Error::Kafka(KafkaError::Consume(e.to_string())))),
        }
    }

    fn stop(&self) -> Result<()> {
        self.consumer
            .unassign()
            .map_err(|e| Error::Kafka(KafkaError::Assignment(e.to_string())))?;
        info!(topic = %self.topic, partition = self.partition, "Partition unassigned");
        Ok(())
    }
}

/// Offset store backed by the consumer group's committed offsets.
pub struct KafkaOffsetStore {
    consumer: Arc<StreamConsumer>,
    timeout: Duration,
}

#[async_trait]
impl OffsetStore for KafkaOffsetStore {
    async fn fetch_committed(&self, key: &CheckpointKey) -> Result<Option<CommittedOffset>> {
        let consumer = self.consumer.clone();
        let timeout = self.timeout;
        let key = key.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<CommittedOffset>> {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition(&key.topic, key.partition);

            let committed = consumer
                .committed_offsets(tpl, timeout)
                .map_err(|e| Error::Kafka(KafkaError::OffsetFetch(e.to_string())))?;

            let found = committed
                .find_partition(&key.topic, key.partition)
                .and_then(|elem| match elem.offset() {
                    Offset::Offset(offset) => Some(CommittedOffset {
                        offset,
                        metadata: elem.metadata().to_string(),
                    }),
                    _ => None,
                });
            Ok(found)
        })
        .await
        .map_err(|e| Error::Kafka(KafkaError::OffsetFetch(format!("Failed to join task: {}", e))))?
    }

    async fn commit(&self, key: &CheckpointKey, offset: i64, metadata: &str) -> Result<()> {
        let tpl = commit_list(key, offset, metadata)?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))
    }

    async fn flush(&self, key: &CheckpointKey, offset: i64, metadata: &str) -> Result<()> {
        let tpl = commit_list(key, offset, metadata)?;
        let consumer = self.consumer.clone();

        // Sync commits block until the coordinator responds
        tokio::task::spawn_blocking(move || -> Result<()> {
            consumer
                .commit(&tpl, CommitMode::Sync)
                .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))
        })
        .await
        .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(format!("Failed to join task: {}", e))))?
    }
}

fn commit_list(key: &CheckpointKey, offset: i64, metadata: &str) -> Result<TopicPartitionList> {
    let mut tpl = TopicPartitionList::new();
    {
        let mut elem = tpl.add_partition(&key.topic, key.partition);
        elem.set_offset(Offset::Offset(offset))
            .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))?;
        elem.set_metadata(metadata);
    }
    Ok(tpl)
}
