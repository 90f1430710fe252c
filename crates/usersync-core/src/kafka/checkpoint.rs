//! Offset checkpointing per (group, topic, partition).
//!
//! A checkpoint stores the next offset to read together with a metadata
//! string. Metadata is never empty once the group has committed, which is
//! how "committed at offset 0" is told apart from "never committed".

use crate::config::OffsetPolicy;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata written with every commit.
pub const CHECKPOINT_METADATA: &str = "consumed";

/// Where the consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Lowest offset still available
    Oldest,
    /// Next offset to be produced
    Newest,
    /// Exact offset
    At(i64),
}

impl From<OffsetPolicy> for StartOffset {
    fn from(policy: OffsetPolicy) -> Self {
        match policy {
            OffsetPolicy::Oldest => StartOffset::Oldest,
            OffsetPolicy::Newest => StartOffset::Newest,
        }
    }
}

impl fmt::Display for StartOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartOffset::Oldest => f.write_str("oldest"),
            StartOffset::Newest => f.write_str("newest"),
            StartOffset::At(offset) => write!(f, "{}", offset),
        }
    }
}

/// Identity of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub group: String,
    pub topic: String,
    pub partition: i32,
}

impl CheckpointKey {
    pub fn new(group: impl Into<String>, topic: impl Into<String>, partition: i32) -> Self {
        Self {
            group: group.into(),
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.topic, self.partition)
    }
}

/// A committed offset as read back from the offset store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOffset {
    pub offset: i64,
    pub metadata: String,
}

/// Durable storage for checkpoints.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Read the last commit for `key`, if any.
    async fn fetch_committed(&self, key: &CheckpointKey) -> Result<Option<CommittedOffset>>;

    /// Persist `offset` with `metadata` for `key`.
    ///
    /// May return before the commit is durable.
    async fn commit(&self, key: &CheckpointKey, offset: i64, metadata: &str) -> Result<()>;

    /// Persist `offset` and wait until the store has acknowledged it.
    async fn flush(&self, key: &CheckpointKey, offset: i64, metadata: &str) -> Result<()> {
        self.commit(key, offset, metadata).await
    }
}

/// Resolves the starting offset and records progress for one partition.
pub struct CheckpointManager {
    store: Arc<dyn OffsetStore>,
    key: CheckpointKey,
    policy: OffsetPolicy,
    /// Last offset the store accepted
    last_committed: Mutex<Option<i64>>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn OffsetStore>, key: CheckpointKey, policy: OffsetPolicy) -> Self {
        Self {
            store,
            key,
            policy,
            last_committed: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &CheckpointKey {
        &self.key
    }

    /// Starting position: the committed offset when metadata marks a prior
    /// commit, otherwise the configured policy.
    pub async fn resolve_start(&self) -> Result<StartOffset> {
        let committed = self.store.fetch_committed(&self.key).await?;

        let start = match committed {
            Some(c) if !c.metadata.is_empty() => {
                info!(
                    checkpoint = %self.key,
                    offset = c.offset,
                    "Resuming from committed offset"
                );
                StartOffset::At(c.offset)
            }
            _ => {
                info!(
                    checkpoint = %self.key,
                    policy = %self.policy,
                    "No checkpoint found, using initial offset policy"
                );
                StartOffset::from(self.policy)
            }
        };

        Ok(start)
    }

    /// Record `next_offset` as the resume point.
    ///
    /// Failures are logged and returned but never retried; the next commit
    /// moves the checkpoint past any gap.
    pub async fn commit(&self, next_offset: i64) -> Result<()> {
        match self
            .store
            .commit(&self.key, next_offset, CHECKPOINT_METADATA)
            .await
        {
            Ok(()) => {
                *self.last_committed.lock() = Some(next_offset);
                debug!(checkpoint = %self.key, offset = next_offset, "Offset committed");
                Ok(())
            }
            Err(e) => {
                warn!(
                    checkpoint = %self.key,
                    offset = next_offset,
                    error = %e,
                    "Offset commit failed"
                );
                Err(e)
            }
        }
    }

    /// Commit the last accepted offset again and wait for the store to
    /// acknowledge it. Does nothing when nothing was committed.
    pub async fn flush(&self) -> Result<()> {
        let Some(offset) = *self.last_committed.lock() else {
            return Ok(());
        };

        match self
            .store
            .flush(&self.key, offset, CHECKPOINT_METADATA)
            .await
        {
            Ok(()) => {
                info!(checkpoint = %self.key, offset, "Final offset committed");
                Ok(())
            }
            Err(e) => {
                warn!(
                    checkpoint = %self.key,
                    offset,
                    error = %e,
                    "Final offset commit failed"
                );
                Err(e)
            }
        }
    }
}
