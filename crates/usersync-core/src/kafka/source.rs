//! Message delivery seam between the broker and the pipeline.

use super::checkpoint::StartOffset;
use super::message::KafkaMessage;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Ordered message delivery for a single partition.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Begin delivery at `start`.
    async fn start(&self, start: StartOffset) -> Result<()>;

    /// Next message in partition order.
    ///
    /// `None` once the source has been stopped or is exhausted.
    async fn recv(&self) -> Option<Result<KafkaMessage>>;

    /// Stop delivering new messages.
    fn stop(&self) -> Result<()>;
}

/// In-memory partition log.
///
/// Honors the start offset like a broker would: `Oldest` replays everything
/// queued, `Newest` skips what was queued before `start`, `At(n)` skips
/// offsets below `n`.
#[derive(Default)]
pub struct MemorySource {
    queue: Mutex<VecDeque<KafkaMessage>>,
    started: Mutex<Option<StartOffset>>,
    stopped: AtomicBool,
    close_when_empty: AtomicBool,
    notify: Notify,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that ends once its queued messages are delivered.
    pub fn finite(messages: impl IntoIterator<Item = KafkaMessage>) -> Self {
        let source = Self::new();
        source.queue.lock().extend(messages);
        source.close_when_empty.store(true, Ordering::SeqCst);
        source
    }

    /// Append a message to the log.
    pub fn push(&self, message: KafkaMessage) {
        self.queue.lock().push_back(message);
        self.notify.notify_one();
    }

    /// End delivery after the queued messages.
    pub fn close(&self) {
        self.close_when_empty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Start offset passed to [`MessageSource::start`].
    pub fn started_at(&self) -> Option<StartOffset> {
        *self.started.lock()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Messages not yet delivered.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn start(&self, start: StartOffset) -> Result<()> {
        {
            let mut queue = self.queue.lock();
            match start {
                StartOffset::Oldest => {}
                StartOffset::Newest => queue.clear(),
                StartOffset::At(offset) => queue.retain(|m| m.offset >= offset),
            }
        }
        *self.started.lock() = Some(start);
        Ok(())
    }

    async fn recv(&self) -> Option<Result<KafkaMessage>> {
        loop {
            if self.is_stopped() {
                return None;
            }
            let next = self.queue.lock().pop_front();
            if let Some(message) = next {
                return Some(Ok(message));
            }
            if self.close_when_empty.load(Ordering::SeqCst) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn messages(offsets: std::ops::Range<i64>) -> Vec<KafkaMessage> {
        offsets
            .map(|offset| KafkaMessage::new("t", 0, offset, "{}"))
            .collect()
    }

    async fn drain(source: &MemorySource) -> Vec<i64> {
        let mut offsets = Vec::new();
        while let Some(Ok(message)) = source.recv().await {
            offsets.push(message.offset);
        }
        offsets
    }

    #[tokio::test]
    async fn test_start_offsets() {
        let oldest = MemorySource::finite(messages(0..3));
        oldest.start(StartOffset::Oldest).await.unwrap();
        assert_eq!(drain(&oldest).await, vec![0, 1, 2]);

        let at = MemorySource::finite(messages(0..5));
        at.start(StartOffset::At(3)).await.unwrap();
        assert_eq!(drain(&at).await, vec![3, 4]);
        assert_eq!(at.started_at(), Some(StartOffset::At(3)));

        let newest = MemorySource::finite(messages(0..5));
        newest.start(StartOffset::Newest).await.unwrap();
        assert!(drain(&newest).await.is_empty());
    }

    #[tokio::test]
    async fn test_recv_waits_for_push() {
        let source = Arc::new(MemorySource::new());
        source.start(StartOffset::Oldest).await.unwrap();

        let reader = {
            let source = source.clone();
            tokio::spawn(async move { source.recv().await })
        };
        tokio::task::yield_now().await;
        source.push(KafkaMessage::new("t", 0, 7, "{}"));

        let message = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(message.offset, 7);
    }

    #[tokio::test]
    async fn test_stop_wakes_reader() {
        let source = Arc::new(MemorySource::new());
        let reader = {
            let source = source.clone();
            tokio::spawn(async move { source.recv().await })
        };
        tokio::task::yield_now().await;
        source.stop().unwrap();

        assert!(reader.await.unwrap().is_none());
        assert!(source.is_stopped());
    }
}
