//! Startup wiring for a consuming pipeline.
//!
//! Acquires, in order:
//! - the column store session
//! - the partition consumer, after checking the partition exists
//! - the checkpoint manager over the consumer group's offsets
//!
//! and hands them to a [`Pipeline`]. When the pipeline closes it commits
//! the last checkpoint synchronously, then releases them in reverse order.

use super::pipeline::{Pipeline, PipelineState, PipelineStats};
use super::processor::MessageProcessor;
use crate::config::Config;
use crate::kafka::{CheckpointKey, CheckpointManager, MessageSource, OffsetStore, PartitionConsumerBuilder};
use crate::store::{CassandraUserStore, UserGateway, UserStore};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// A configured pipeline ready to run.
pub struct IngestionEngine {
    pipeline: Pipeline,
}

impl IngestionEngine {
    /// Connect to the store and the broker and build the pipeline.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CassandraUserStore::connect(&config.store).await?);

        let consumer = PartitionConsumerBuilder::new(config.kafka.clone()).build()?;
        let partitions = consumer
            .discover_partitions(&config.kafka.partitions)
            .await?;
        consumer.ensure_partition(&partitions)?;

        let offsets = Arc::new(consumer.offset_store());
        let key = consumer.checkpoint_key();

        info!(
            topic = %config.kafka.topic,
            partition = config.kafka.partition,
            keyspace = %config.store.keyspace,
            table = %config.store.table,
            "Ingestion engine initialized"
        );

        Ok(Self::from_parts(
            &config,
            Arc::new(consumer),
            store,
            offsets,
            key,
        ))
    }

    /// Build from already-acquired handles.
    pub fn from_parts(
        config: &Config,
        source: Arc<dyn MessageSource>,
        store: Arc<dyn UserStore>,
        offsets: Arc<dyn OffsetStore>,
        key: CheckpointKey,
    ) -> Self {
        let checkpoint = CheckpointManager::new(offsets, key, config.kafka.offset);
        let gateway = UserGateway::new(store, config.store.table.clone());
        let processor = MessageProcessor::new(gateway, checkpoint, config.pipeline.action);

        Self {
            pipeline: Pipeline::new(source, processor, config.pipeline.buffer_size),
        }
    }

    /// Get shutdown signal sender.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.pipeline.shutdown_signal()
    }

    /// Watch the pipeline state.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.pipeline.state()
    }

    /// Consume until shutdown; returns after the queue is drained.
    pub async fn run(self) -> Result<PipelineStats> {
        info!("Ingestion engine started");
        self.pipeline.run().await
    }
}
