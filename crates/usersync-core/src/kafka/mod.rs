//! Kafka delivery and offset checkpointing.

mod checkpoint;
mod consumer;
mod message;
mod offset;
mod source;

pub use checkpoint::{
    CheckpointKey, CheckpointManager, CommittedOffset, OffsetStore, StartOffset,
    CHECKPOINT_METADATA,
};
pub use consumer::{KafkaOffsetStore, PartitionConsumer, PartitionConsumerBuilder, RetryConfig};
pub use message::KafkaMessage;
pub use offset::MemoryOffsetStore;
pub use source::{MemorySource, MessageSource};
