//! Consume command implementation.

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{info, warn};
use usersync_core::engine::IngestionEngine;
use usersync_core::Config;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Run the consuming pipeline until SIGINT or SIGTERM, then drain.
pub async fn run(config: Config) -> Result<()> {
    info!(
        topic = %config.kafka.topic,
        partition = config.kafka.partition,
        group = %config.kafka.consumer_group,
        action = %config.pipeline.action,
        "Starting consumer"
    );

    let engine = IngestionEngine::new(config).await?;

    // Spawn a task to handle shutdown signals (SIGINT and SIGTERM)
    tokio::spawn(wait_for_signal(engine.shutdown_signal()));

    let stats = engine.run().await?;

    info!(
        consumed = stats.consumed,
        persisted = stats.persisted,
        rejected = stats.rejected,
        failed = stats.failed,
        "Consumer stopped"
    );
    Ok(())
}

async fn wait_for_signal(shutdown: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating graceful shutdown");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    let _ = shutdown.send(());
}
