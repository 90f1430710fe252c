//! Validate command implementation.

use anyhow::Result;
use usersync_core::store::{check_protocol_version, parse_consistency};
use usersync_core::{Config, Error};

/// Check everything that can be checked without connecting.
pub fn run(config: &Config) -> Result<()> {
    check(config)?;

    println!("Configuration is valid");
    println!(
        "  kafka:    {} partition {} of {} (group {}, start {})",
        config.kafka.brokers.join(","),
        config.kafka.partition,
        config.kafka.topic,
        config.kafka.consumer_group,
        config.kafka.offset
    );
    println!(
        "  store:    {} keyspace {} table {} (consistency {})",
        config.store.peers.join(","),
        config.store.keyspace,
        config.store.table,
        config.store.consistency
    );
    println!(
        "  pipeline: {} with buffer size {}",
        config.pipeline.action, config.pipeline.buffer_size
    );
    Ok(())
}

fn check(config: &Config) -> usersync_core::Result<()> {
    config.validate()?;
    parse_consistency(&config.store.consistency).map_err(|e| Error::Config(e.to_string()))?;
    check_protocol_version(config.store.protocol_version)
        .map_err(|e| Error::Config(e.to_string()))?;
    Ok(())
}
