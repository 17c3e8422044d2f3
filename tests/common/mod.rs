#![allow(dead_code)]

use cdc_publisher::checkpoint::CompletionSink;
use cdc_publisher::config::ProducerConfig;
use cdc_publisher::event::{ChangeEvent, Position, RowIdentity};
use cdc_publisher::kafka::{
    BrokerClient, BrokerRecord, DeliveryCallback, DeliveryReport, Rejected, TopicMetadata,
};
use cdc_publisher::lifecycle::Terminator;
use cdc_publisher::{Error, Result, SendError};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock broker does with the next record it is given.
#[derive(Debug)]
pub enum Outcome {
    /// Acknowledge right away.
    Deliver,
    /// Accept, then report this failure through the callback.
    Fail(SendError),
    /// Refuse synchronously.
    Reject(SendError),
    /// Accept and keep the callback until [`MockBroker::release`].
    Hold,
}

/// In-memory broker client with scripted outcomes.
///
/// Callbacks run inline on the sending task. Records without a scripted
/// outcome are delivered.
#[derive(Default)]
pub struct MockBroker {
    script: Mutex<VecDeque<Outcome>>,
    partitions: Mutex<HashMap<String, i32>>,
    metadata_unavailable: AtomicBool,
    queue_full: AtomicBool,
    sent: Mutex<Vec<BrokerRecord>>,
    held: Mutex<Vec<Box<dyn DeliveryCallback>>>,
    attempts: AtomicUsize,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn set_partitions(&self, topic: &str, partitions: i32) {
        self.partitions
            .lock()
            .unwrap()
            .insert(topic.to_string(), partitions);
    }

    pub fn set_metadata_unavailable(&self, unavailable: bool) {
        self.metadata_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// While set, every send is refused with a local queue-full error.
    pub fn set_queue_full(&self, full: bool) {
        self.queue_full.store(full, Ordering::SeqCst);
    }

    /// Records accepted so far, in submission order.
    pub fn sent(&self) -> Vec<BrokerRecord> {
        self.sent.lock().unwrap().clone()
    }

    /// Send calls so far, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Delivers the held record at `index` (in hold order).
    pub fn release(&self, index: usize) {
        let callback = self.held.lock().unwrap().remove(index);
        callback.on_delivery(Ok(DeliveryReport {
            partition: 0,
            offset: index as i64,
        }));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl TopicMetadata for MockBroker {
    fn partition_count(&self, topic: &str) -> Result<i32> {
        if self.metadata_unavailable.load(Ordering::SeqCst) {
            return Err(Error::BrokerMetadata {
                topic: topic.to_string(),
                message: "leader not available".to_string(),
            });
        }
        Ok(self
            .partitions
            .lock()
            .unwrap()
            .get(topic)
            .copied()
            .unwrap_or(1))
    }
}

impl BrokerClient for MockBroker {
    fn send(
        &self,
        record: BrokerRecord,
        callback: Box<dyn DeliveryCallback>,
    ) -> std::result::Result<(), Rejected> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.closed.load(Ordering::SeqCst) {
            return Err(Rejected {
                error: SendError::Closed,
                record,
                callback,
            });
        }
        if self.queue_full.load(Ordering::SeqCst) {
            return Err(Rejected {
                error: queue_full(),
                record,
                callback,
            });
        }

        // The lock is released before any callback runs, since callbacks may
        // send dead-letter records back through this client.
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Deliver);

        if let Outcome::Reject(error) = outcome {
            return Err(Rejected {
                error,
                record,
                callback,
            });
        }

        let partition = record.partition.unwrap_or(0);
        let mut sent = self.sent.lock().unwrap();
        let offset = sent.len() as i64;
        sent.push(record);
        drop(sent);

        match outcome {
            Outcome::Deliver => callback.on_delivery(Ok(DeliveryReport { partition, offset })),
            Outcome::Fail(error) => callback.on_delivery(Err(error)),
            Outcome::Hold => self.held.lock().unwrap().push(callback),
            Outcome::Reject(_) => unreachable!(),
        }
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Terminator that only records its causes.
#[derive(Default)]
pub struct RecordingTerminator {
    causes: Mutex<Vec<String>>,
}

impl RecordingTerminator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.causes.lock().unwrap().len()
    }

    pub fn causes(&self) -> Vec<String> {
        self.causes.lock().unwrap().clone()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, cause: Error) {
        self.causes.lock().unwrap().push(cause.to_string());
    }
}

/// Completion sink that records every signal.
#[derive(Default)]
pub struct RecordingSink {
    submitted: Mutex<Vec<Position>>,
    completed: Mutex<Vec<Position>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn submitted_positions(&self) -> Vec<Position> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn completed_positions(&self) -> Vec<Position> {
        self.completed.lock().unwrap().clone()
    }
}

impl CompletionSink for RecordingSink {
    fn submitted(&self, position: &Position) {
        self.submitted.lock().unwrap().push(position.clone());
    }

    fn completed(&self, position: &Position) {
        self.completed.lock().unwrap().push(position.clone());
    }
}

pub fn queue_full() -> SendError {
    SendError::Kafka(KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull))
}

pub fn timed_out() -> SendError {
    SendError::Kafka(KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut))
}

pub fn too_large() -> SendError {
    SendError::Kafka(KafkaError::MessageProduction(
        RDKafkaErrorCode::MessageSizeTooLarge,
    ))
}

pub fn position(offset: u64) -> Position {
    Position::new("mysql-bin.000001", offset)
}

pub fn row_event(offset: u64, id: i64) -> ChangeEvent {
    ChangeEvent::row(
        position(offset),
        RowIdentity::new("shop", "users").with_key_column("id", id),
        format!(r#"{{"id":{},"name":"user {}"}}"#, id, id),
    )
}

pub fn producer_config() -> ProducerConfig {
    ProducerConfig {
        topic: "maxwell".to_string(),
        queue_capacity: 10,
        ..Default::default()
    }
}

/// Polls `condition` until it holds, for at most five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Kafka settings for tests against a live broker (`TEST_KAFKA_BROKERS`).
pub fn kafka_config() -> cdc_publisher::config::KafkaConfig {
    cdc_publisher::config::KafkaConfig {
        brokers: std::env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        compression: "none".to_string(), // No compression for tests
        acks: "all".to_string(),
        linger_ms: 0, // Immediate sending for tests
        batch_size: 16384,
        queue_buffering_max_kbytes: 1024,
        message_max_bytes: 1_000_000,
        metadata_timeout_ms: 10_000,
        close_timeout_ms: 10_000,
        properties: HashMap::new(),
    }
}
