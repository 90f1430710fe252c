//! Single-partition consumption loop.
//!
//! A forwarding task moves delivered messages into a bounded queue and a
//! processing task handles them one at a time, in delivery order. On
//! shutdown the forwarder stops the source and closes the queue; the
//! processing task finishes everything already queued before `run`
//! returns.

use super::processor::{MessageProcessor, Outcome, Processed};
use crate::kafka::{KafkaMessage, MessageSource, RetryConfig};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    ResolvingOffset,
    Streaming,
    Draining,
    Closed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Initializing => "initializing",
            PipelineState::ResolvingOffset => "resolving-offset",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub consumed: u64,
    pub persisted: u64,
    pub noop: u64,
    pub rejected: u64,
    pub failed: u64,
    pub commit_failures: u64,
    /// Offset of the last processed message
    pub last_offset: Option<i64>,
}

impl PipelineStats {
    fn record(&mut self, processed: &Processed) {
        self.consumed += 1;
        match processed.outcome {
            Outcome::Persisted => self.persisted += 1,
            Outcome::NoOp => self.noop += 1,
            Outcome::Rejected(_) => self.rejected += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
        if !processed.committed {
            self.commit_failures += 1;
        }
        self.last_offset = Some(processed.offset);
    }
}

/// Consumption loop for one partition.
pub struct Pipeline {
    source: Arc<dyn MessageSource>,
    processor: MessageProcessor,
    buffer_size: usize,
    retry: RetryConfig,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<PipelineState>,
}

impl Pipeline {
    /// Create a pipeline with a queue of `buffer_size` messages.
    pub fn new(
        source: Arc<dyn MessageSource>,
        processor: MessageProcessor,
        buffer_size: usize,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (state_tx, _) = watch::channel(PipelineState::Initializing);
        Self {
            source,
            processor,
            buffer_size: buffer_size.max(1),
            retry: RetryConfig::default(),
            shutdown_tx,
            shutdown_rx,
            state_tx,
        }
    }

    /// Set the backoff used when the source reports errors.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get shutdown signal sender.
    ///
    /// A signal sent at any point after construction is observed by `run`.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Watch the pipeline state.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    /// Run until shutdown or until the source is exhausted.
    ///
    /// Returns only after every message handed to the queue has been
    /// processed and checkpointed.
    pub async fn run(self) -> Result<PipelineStats> {
        let Pipeline {
            source,
            processor,
            buffer_size,
            retry,
            shutdown_tx,
            shutdown_rx,
            state_tx,
        } = self;
        let transition = |state: PipelineState| {
            let previous = state_tx.send_replace(state);
            info!(from = %previous, to = %state, "Pipeline state changed");
        };

        transition(PipelineState::ResolvingOffset);
        let start = match processor.checkpoint().resolve_start().await {
            Ok(start) => start,
            Err(e) => {
                transition(PipelineState::Closed);
                return Err(e);
            }
        };
        if let Err(e) = source.start(start).await {
            transition(PipelineState::Closed);
            return Err(e);
        }

        transition(PipelineState::Streaming);
        info!(
            start = %start,
            buffer_size,
            action = %processor.action(),
            "Consuming"
        );

        let (tx, rx) = mpsc::channel(buffer_size);
        let forwarder = tokio::spawn(forward(source.clone(), tx, shutdown_rx, retry));
        let worker = tokio::spawn(process(processor, rx));

        let forwarded = forwarder.await.map_err(|e| join_error("forwarding", e))?;
        transition(PipelineState::Draining);

        let (stats, processor) = worker.await.map_err(|e| join_error("processing", e))?;

        // Release in reverse order of acquisition: offsets, consumer, store
        let (gateway, checkpoint) = processor.into_parts();
        if checkpoint.flush().await.is_err() {
            warn!(last_offset = ?stats.last_offset, "Last checkpoint may not be durable");
        }
        drop(checkpoint);
        drop(source);
        drop(gateway);
        drop(shutdown_tx);
        transition(PipelineState::Closed);

        info!(
            forwarded,
            consumed = stats.consumed,
            persisted = stats.persisted,
            noop = stats.noop,
            rejected = stats.rejected,
            failed = stats.failed,
            commit_failures = stats.commit_failures,
            last_offset = ?stats.last_offset,
            "Pipeline closed"
        );
        Ok(stats)
    }
}

fn join_error(task: &str, err: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Failed to join {} task: {}", task, err),
    ))
}

/// Move messages from `source` into the queue until shutdown or exhaustion.
async fn forward(
    source: Arc<dyn MessageSource>,
    tx: mpsc::Sender<KafkaMessage>,
    mut shutdown_rx: broadcast::Receiver<()>,
    retry: RetryConfig,
) -> u64 {
    let mut forwarded = 0u64;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping delivery");
                break;
            }

            next = source.recv() => {
                match next {
                    Some(Ok(message)) => {
                        failures = 0;
                        // Blocks while the queue is full
                        if tx.send(message).await.is_err() {
                            warn!("Processing task stopped, dropping delivery");
                            break;
                        }
                        forwarded += 1;
                    }
                    Some(Err(e)) => {
                        failures += 1;
                        let backoff = retry.calculate_delay(failures);
                        if retry.should_retry(failures) {
                            warn!(
                                failures,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Consume error, backing off"
                            );
                        } else {
                            error!(
                                failures,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Consume keeps failing, backing off"
                            );
                        }

                        tokio::select! {
                            biased;
                            _ = shutdown_rx.recv() => {
                                info!("Shutdown signal received during backoff");
                                break;
                            }
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                    None => {
                        info!("Message source exhausted");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = source.stop() {
        warn!(error = %e, "Failed to stop message source");
    }
    // Dropping `tx` closes the queue once it drains
    drop(tx);
    forwarded
}

/// Process queued messages strictly in order until the queue closes.
///
/// Hands the processor back so the caller controls when its handles go.
async fn process(
    processor: MessageProcessor,
    mut rx: mpsc::Receiver<KafkaMessage>,
) -> (PipelineStats, MessageProcessor) {
    let mut stats = PipelineStats::default();
    while let Some(message) = rx.recv().await {
        let processed = processor.process(&message).await;
        stats.record(&processed);
    }
    (stats, processor)
}
