//! usersync CLI - Kafka user lifecycle consumer for Cassandra.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use usersync_core::config::{Action, LogFormat, OffsetPolicy, PartitionSelection};
use usersync_core::Config;

/// Exit codes for CLI operations.
///
/// Following sysexits.h:
/// - 0: Success
/// - 64: Usage error (bad flags, missing or invalid configuration)
/// - 69: Service unavailable (store or broker unreachable, partition missing)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Command line usage error
    Usage = 64,
    /// Runtime startup failure
    Unavailable = 69,
}

impl ExitCode {
    /// Convert an error to an exit code by inspecting its type.
    fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<usersync_core::Error>() {
            Some(usersync_core::Error::Config(_)) => ExitCode::Usage,
            _ => ExitCode::Unavailable,
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "usersync")]
#[command(about = "Consume user lifecycle events from Kafka into Cassandra", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace); also enables
    /// Kafka client debug output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume one partition until interrupted
    Consume {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Validate configuration
    Validate {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings taken from flags or the environment, over the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// The comma separated list of brokers in the Kafka cluster
    #[arg(long, env = "KAFKA_PEERS")]
    pub brokers: Option<String>,

    /// The topic to consume
    #[arg(long, env = "KAFKA_TOPICS")]
    pub topic: Option<String>,

    /// The partitions of the topic: `all` or a comma separated list
    #[arg(long)]
    pub partitions: Option<PartitionSelection>,

    /// The partition to consume
    #[arg(long, env = "KAFKA_PARTITION")]
    pub partition: Option<i32>,

    /// Consumer group owning the offset checkpoints
    #[arg(long, env = "KAFKA_CONSUMER_GROUP")]
    pub consumer_group: Option<String>,

    /// The offset to start with when no checkpoint exists: `oldest` or `newest`
    #[arg(long)]
    pub offset: Option<OffsetPolicy>,

    /// The buffer size of the message queue
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Lifecycle action applied to each message: `create`, `update` or `remove`
    #[arg(long)]
    pub action: Option<Action>,

    /// The comma separated list of Cassandra peers
    #[arg(long, env = "CASSANDRA_PEERS")]
    pub store_peers: Option<String>,

    /// Keyspace holding the user table
    #[arg(long, env = "CASSANDRA_KEYSPACE")]
    pub keyspace: Option<String>,

    /// Consistency level, e.g. `ONE` or `LOCAL_QUORUM`
    #[arg(long, env = "CASSANDRA_CONSISTENCY")]
    pub consistency: Option<String>,

    /// Native protocol version
    #[arg(long, env = "CASSANDRA_PROTOCOL_VERSION")]
    pub protocol_version: Option<u8>,

    /// Connection timeout in milliseconds
    #[arg(long, env = "CASSANDRA_CONNECTION_TIMEOUT")]
    pub connection_timeout: Option<u64>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Overrides {
    /// Apply flag and environment values on top of `config`.
    pub fn apply(self, config: &mut Config, verbose: u8) {
        if let Some(brokers) = self.brokers {
            config.kafka.brokers = split_list(&brokers);
        }
        if let Some(topic) = self.topic {
            config.kafka.topic = topic;
        }
        if let Some(partitions) = self.partitions {
            config.kafka.partitions = partitions;
        }
        if let Some(partition) = self.partition {
            config.kafka.partition = partition;
        }
        if let Some(group) = self.consumer_group {
            config.kafka.consumer_group = group;
        }
        if let Some(offset) = self.offset {
            config.kafka.offset = offset;
        }
        if verbose > 0 {
            config.kafka.verbose = true;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.pipeline.buffer_size = buffer_size;
        }
        if let Some(action) = self.action {
            config.pipeline.action = action;
        }
        if let Some(peers) = self.store_peers {
            config.store.peers = split_list(&peers);
        }
        if let Some(keyspace) = self.keyspace {
            config.store.keyspace = keyspace;
        }
        if let Some(consistency) = self.consistency {
            config.store.consistency = consistency;
        }
        if let Some(version) = self.protocol_version {
            config.store.protocol_version = Some(version);
        }
        if let Some(timeout) = self.connection_timeout {
            config.store.connection_timeout_ms = timeout;
        }
    }
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not errors
            return if e.use_stderr() {
                ExitCode::Usage
            } else {
                ExitCode::Success
            };
        }
    };

    // Try to load config for log settings (optional - falls back to defaults)
    let monitoring = cli
        .config
        .as_ref()
        .and_then(|path| Config::from_file(path).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_filter()),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Configure log format based on config
    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    let result = execute_command(cli).await;

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Consume { overrides } => {
            let config = build_config(&cli.config, overrides, cli.verbose)?;
            commands::consume::run(config).await?;
        }

        Commands::Validate { overrides } => {
            let config = build_config(&cli.config, overrides, cli.verbose)?;
            commands::validate::run(&config)?;
        }
    }

    Ok(())
}

/// Defaults, then the config file, then environment and flags.
fn build_config(path: &Option<PathBuf>, overrides: Overrides, verbose: u8) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path).map_err(|e| {
            usersync_core::Error::Config(format!("{}: {}", path.display(), e))
        })?,
        None => Config::default(),
    };
    overrides.apply(&mut config, verbose);
    config.validate()?;
    Ok(config)
}
