//! Integration tests against a real Kafka broker.
//!
//! These tests require Docker to be running and are marked with #[ignore]
//! to avoid running them in normal test runs.
//!
//! Run with: cargo test --test kafka_integration -- --ignored

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::Kafka;
use usersync_core::config::{Action, KafkaConfig, OffsetPolicy, PartitionSelection};
use usersync_core::engine::IngestionEngine;
use usersync_core::kafka::{CheckpointManager, PartitionConsumerBuilder, StartOffset};
use usersync_core::store::MemoryUserStore;
use usersync_core::{Config, Error, KafkaError};

const TOPIC: &str = "user-create";

async fn create_topic(bootstrap_servers: &str, partitions: i32) {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .create()
        .expect("Failed to create admin client");

    let topic = NewTopic::new(TOPIC, partitions, TopicReplication::Fixed(1));
    admin
        .create_topics(&[topic], &AdminOptions::new())
        .await
        .expect("Failed to create topic");
}

async fn produce(bootstrap_servers: &str, partition: i32, count: usize) {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("message.timeout.ms", "5000")
        .create()
        .expect("Failed to create producer");

    for i in 0..count {
        let key = format!("user-{}", i);
        let payload = format!(
            r#"{{"version":1,"data":{{"login":"user-{}","password":"p","name":"n","birthdate":"1000","emails":["u{}@example.com"]}}}}"#,
            i, i
        );
        producer
            .send(
                FutureRecord::to(TOPIC)
                    .partition(partition)
                    .key(&key)
                    .payload(&payload),
                Duration::from_secs(5),
            )
            .await
            .expect("Failed to produce message");
    }
}

fn kafka_config(bootstrap_servers: &str, partition: i32) -> KafkaConfig {
    KafkaConfig {
        brokers: vec![bootstrap_servers.to_string()],
        topic: TOPIC.into(),
        partition,
        consumer_group: "usersync-it".into(),
        offset: OffsetPolicy::Oldest,
        ..Default::default()
    }
}

/// Consume one partition into the in-memory store, then resume.
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_consume_partition_and_resume() {
    let kafka = Kafka::default()
        .start()
        .await
        .expect("Failed to start Kafka container");
    let bootstrap_servers = format!(
        "127.0.0.1:{}",
        kafka
            .get_host_port_ipv4(9093)
            .await
            .expect("Failed to get Kafka port")
    );

    create_topic(&bootstrap_servers, 2).await;
    produce(&bootstrap_servers, 1, 5).await;

    let mut config = Config::default();
    config.kafka = kafka_config(&bootstrap_servers, 1);
    config.pipeline.action = Action::Create;

    let consumer = PartitionConsumerBuilder::new(config.kafka.clone())
        .build()
        .expect("Failed to build consumer");
    let partitions = consumer
        .discover_partitions(&PartitionSelection::All)
        .await
        .expect("Failed to discover partitions");
    assert_eq!(partitions.len(), 2);
    consumer.ensure_partition(&partitions).unwrap();

    let offsets = Arc::new(consumer.offset_store());
    let key = consumer.checkpoint_key();
    let users = Arc::new(MemoryUserStore::new());

    let engine = IngestionEngine::from_parts(
        &config,
        Arc::new(consumer),
        users.clone(),
        offsets.clone(),
        key.clone(),
    );
    let shutdown = engine.shutdown_signal();
    let handle = tokio::spawn(engine.run());

    tokio::time::timeout(Duration::from_secs(30), async {
        while users.row_count() < 5 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("all messages persisted");

    shutdown.send(()).unwrap();
    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.persisted, 5);
    assert_eq!(stats.last_offset, Some(4));

    // The final checkpoint is durable once `run` returns, so a fresh
    // consumer in the same group resumes after the last message
    let resumed = PartitionConsumerBuilder::new(config.kafka.clone())
        .build()
        .unwrap();
    let manager = CheckpointManager::new(
        Arc::new(resumed.offset_store()),
        resumed.checkpoint_key(),
        OffsetPolicy::Oldest,
    );
    assert_eq!(manager.resolve_start().await.unwrap(), StartOffset::At(5));
}

/// A partition the topic does not have is a startup failure.
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_missing_partition() {
    let kafka = Kafka::default()
        .start()
        .await
        .expect("Failed to start Kafka container");
    let bootstrap_servers = format!(
        "127.0.0.1:{}",
        kafka
            .get_host_port_ipv4(9093)
            .await
            .expect("Failed to get Kafka port")
    );
    create_topic(&bootstrap_servers, 1).await;

    let consumer = PartitionConsumerBuilder::new(kafka_config(&bootstrap_servers, 3))
        .build()
        .unwrap();
    let partitions = consumer
        .discover_partitions(&PartitionSelection::All)
        .await
        .unwrap();

    let err = consumer.ensure_partition(&partitions).unwrap_err();
    assert!(matches!(
        err,
        Error::Kafka(KafkaError::PartitionNotFound { partition: 3, .. })
    ));
}
