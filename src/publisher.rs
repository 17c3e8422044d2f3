//! Entry point for the replication reader and the supervising process.
//!
//! # Example
//!
//! ```rust,no_run
//! use cdc_publisher::checkpoint::InflightPositions;
//! use cdc_publisher::config::ProducerConfig;
//! use cdc_publisher::event::{ChangeEvent, Position, RowIdentity};
//! use cdc_publisher::kafka::KafkaBrokerClient;
//! use cdc_publisher::lifecycle::ShutdownTerminator;
//! use cdc_publisher::{Config, Publisher};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> cdc_publisher::Result<()> {
//! let config = Config::from_file("config.toml")?;
//! let client = Arc::new(KafkaBrokerClient::new(&config.kafka)?);
//! let publisher = Publisher::new(
//!     &config.producer,
//!     client,
//!     Arc::new(InflightPositions::new()),
//!     Arc::new(ShutdownTerminator::new()),
//! )?;
//!
//! let event = ChangeEvent::row(
//!     Position::new("mysql-bin.000001", 4),
//!     RowIdentity::new("shop", "users").with_key_column("id", 5),
//!     r#"{"id":5}"#,
//! );
//! publisher.push(event).await?;
//!
//! publisher.request_stop();
//! publisher.await_stop(Duration::from_secs(30)).await?;
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::CompletionSink;
use crate::config::ProducerConfig;
use crate::event::{ChangeEvent, Position};
use crate::kafka::{
    BrokerClient, PublishContext, RecordBuilder, TopicTemplate, Worker, WorkerStatus,
};
use crate::lifecycle::{TaskState, TaskStateHandle, Terminator};
use crate::metrics::{MetricsSnapshot, ProducerMetrics};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Point-in-time view of the publisher for health checks.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub queue_depth: usize,
    pub last_position: Option<Position>,
    pub worker_state: TaskState,
    pub metrics: MetricsSnapshot,
}

pub struct Publisher {
    queue: mpsc::Sender<ChangeEvent>,
    state: Arc<TaskStateHandle>,
    status: Arc<WorkerStatus>,
    publish: Arc<PublishContext>,
}

impl Publisher {
    /// Builds the publishing pipeline and spawns its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &ProducerConfig,
        client: Arc<dyn BrokerClient>,
        completions: Arc<dyn CompletionSink>,
        terminator: Arc<dyn Terminator>,
    ) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(Error::Config(
                "producer.queue_capacity must be positive".to_string(),
            ));
        }

        let builder = RecordBuilder::new(
            TopicTemplate::new(config.topic.as_str()),
            TopicTemplate::new(config.schema_topic()),
            config.partitioner()?,
            config.schema_partitioner(),
            config.key_format,
        );

        let publish = Arc::new(PublishContext {
            metrics: Arc::new(ProducerMetrics::default()),
            fallback_topic: config.dead_letter_topic.as_deref().map(TopicTemplate::new),
            ignore_producer_errors: config.ignore_producer_errors,
            client,
            builder: Arc::new(builder),
            terminator,
        });

        let (queue, rx) = mpsc::channel(config.queue_capacity);
        let state = Arc::new(TaskStateHandle::new("kafka-producer-worker"));
        let status = Arc::new(WorkerStatus::default());

        let worker = Worker::new(
            rx,
            publish.clone(),
            completions,
            state.clone(),
            status.clone(),
        );
        tokio::spawn(worker.run());

        Ok(Self {
            queue,
            state,
            status,
            publish,
        })
    }

    /// Queues `event`, waiting while the queue is full.
    ///
    /// Fails with [`Error::QueueInterrupted`] once the worker has stopped.
    pub async fn push(&self, event: ChangeEvent) -> Result<()> {
        self.queue
            .send(event)
            .await
            .map_err(|_| Error::QueueInterrupted)
    }

    /// Asks the worker to submit what is queued, close the broker client and stop.
    pub fn request_stop(&self) {
        self.state.request_stop();
    }

    /// Waits for the worker to stop; [`Error::Timeout`] if it takes longer than `timeout`.
    pub async fn await_stop(&self, timeout: Duration) -> Result<()> {
        self.state.await_stopped(timeout).await
    }

    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    pub fn metrics(&self) -> Arc<ProducerMetrics> {
        self.publish.metrics.clone()
    }

    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic {
            queue_depth: self.queue.max_capacity() - self.queue.capacity(),
            last_position: self.status.last_position(),
            worker_state: self.state.get(),
            metrics: self.publish.metrics.snapshot(),
        }
    }

    /// Closes the broker client immediately, without waiting for the worker.
    /// Records the worker submits afterwards are rejected as closed.
    pub fn close(&self) {
        self.publish.client.close();
    }
}
