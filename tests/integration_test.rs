mod common;

use cdc_publisher::checkpoint::InflightPositions;
use cdc_publisher::config::ProducerConfig;
use cdc_publisher::event::{ChangeEvent, RowIdentity};
use cdc_publisher::kafka::KafkaBrokerClient;
use cdc_publisher::lifecycle::ShutdownTerminator;
use cdc_publisher::Publisher;
use common::*;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

async fn create_test_consumer(topics: &[&str]) -> StreamConsumer {
    let brokers = kafka_config().brokers.join(",");
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", format!("cdc_publisher_test_{}", std::process::id()))
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .expect("Failed to create consumer");
    consumer.subscribe(topics).expect("Failed to subscribe");
    consumer
}

async fn consume(consumer: &StreamConsumer, expected: usize) -> Vec<(String, Option<String>, Value)> {
    let mut received = Vec::new();
    let start = tokio::time::Instant::now();

    while received.len() < expected && start.elapsed() < Duration::from_secs(30) {
        if let Ok(Ok(message)) = timeout(Duration::from_secs(1), consumer.recv()).await {
            let key = message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned());
            let value: Value = serde_json::from_slice(message.payload().unwrap()).unwrap();
            info!("Received message on {}", message.topic());
            received.push((message.topic().to_string(), key, value));
        }
    }
    received
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_end_to_end_publishing() {
    tracing_subscriber::fmt()
        .with_env_filter("cdc_publisher=debug,rdkafka=info")
        .try_init()
        .ok();

    let suffix = std::process::id();
    let topic = format!("cdc_it_{}", suffix);
    let dead_letter_topic = format!("cdc_it_dlq_{}", suffix);

    let mut kafka = kafka_config();
    kafka.message_max_bytes = 10_000;
    let producer = ProducerConfig {
        topic: topic.clone(),
        dead_letter_topic: Some(dead_letter_topic.clone()),
        ..producer_config()
    };

    let client = Arc::new(KafkaBrokerClient::new(&kafka).unwrap());
    let inflight = Arc::new(InflightPositions::new());
    let terminator = Arc::new(ShutdownTerminator::new());
    let publisher = Publisher::new(&producer, client, inflight.clone(), terminator.clone()).unwrap();

    for i in 1..=3 {
        publisher.push(row_event(i * 10, i as i64)).await.unwrap();
    }
    let oversized = ChangeEvent::row(
        position(40),
        RowIdentity::new("shop", "users").with_key_column("id", 4),
        format!(r#"{{"id":4,"blob":"{}"}}"#, "x".repeat(50_000)),
    );
    publisher.push(oversized).await.unwrap();

    publisher.request_stop();
    publisher.await_stop(Duration::from_secs(30)).await.unwrap();
    assert!(!terminator.is_terminated());
    assert_eq!(inflight.safe_position(), Some(position(40)));

    let consumer = create_test_consumer(&[topic.as_str(), dead_letter_topic.as_str()]).await;
    let received = consume(&consumer, 4).await;
    assert_eq!(received.len(), 4);

    let rows: Vec<_> = received.iter().filter(|(t, _, _)| *t == topic).collect();
    assert_eq!(rows.len(), 3);
    for (i, (_, key, value)) in rows.iter().enumerate() {
        assert_eq!(value["id"], i as i64 + 1);
        assert_eq!(key.as_ref().map(String::len), Some(64));
    }

    let (_, _, dead_letter) = received
        .iter()
        .find(|(t, _, _)| *t == dead_letter_topic)
        .expect("dead-letter record");
    assert_eq!(dead_letter["data"]["id"], 4);
    assert_eq!(dead_letter["fallback_reason"], "MessageSizeTooLarge");
}
