//! In-memory offset store.

use super::checkpoint::{CheckpointKey, CommittedOffset, OffsetStore};
use crate::{Error, KafkaError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Checkpoints held in memory, keyed by (group, topic, partition).
pub struct MemoryOffsetStore {
    committed: DashMap<CheckpointKey, CommittedOffset>,

    /// Every offset passed to `commit`, in call order
    history: Mutex<Vec<(CheckpointKey, i64)>>,

    /// Every offset passed to `flush`, in call order
    flushes: Mutex<Vec<(CheckpointKey, i64)>>,

    fail_commits: AtomicBool,
}

impl MemoryOffsetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            committed: DashMap::new(),
            history: Mutex::new(Vec::new()),
            flushes: Mutex::new(Vec::new()),
            fail_commits: AtomicBool::new(false),
        }
    }

    /// Make subsequent commits fail (or succeed again).
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Get the committed offset for a checkpoint.
    pub fn committed(&self, key: &CheckpointKey) -> Option<CommittedOffset> {
        self.committed.get(key).map(|entry| entry.value().clone())
    }

    /// Offsets attempted for `key`, including failed attempts.
    pub fn history(&self, key: &CheckpointKey) -> Vec<i64> {
        self.history
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, offset)| *offset)
            .collect()
    }

    /// Offsets flushed for `key`.
    pub fn flushes(&self, key: &CheckpointKey) -> Vec<i64> {
        self.flushes
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, offset)| *offset)
            .collect()
    }

    /// Clear all checkpoints.
    pub fn clear(&self) {
        self.committed.clear();
        self.history.lock().clear();
        self.flushes.lock().clear();
    }

    fn apply(&self, key: &CheckpointKey, offset: i64, metadata: &str) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::Kafka(KafkaError::OffsetCommit(format!(
                "commit rejected for {}",
                key
            ))));
        }

        self.committed.insert(
            key.clone(),
            CommittedOffset {
                offset,
                metadata: metadata.to_string(),
            },
        );
        Ok(())
    }
}

impl Default for MemoryOffsetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn fetch_committed(&self, key: &CheckpointKey) -> Result<Option<CommittedOffset>> {
        Ok(self.committed(key))
    }

    async fn commit(&self, key: &CheckpointKey, offset: i64, metadata: &str) -> Result<()> {
        self.history.lock().push((key.clone(), offset));
        self.apply(key, offset, metadata)
    }

    async fn flush(&self, key: &CheckpointKey, offset: i64, metadata: &str) -> Result<()> {
        self.flushes.lock().push((key.clone(), offset));
        self.apply(key, offset, metadata)
    }
}
