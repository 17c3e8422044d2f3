//! Error types and result handling for cdc-publisher.
//!
//! This module defines the main error type [`Error`], the per-record
//! [`SendError`] reported by a broker, and a convenience [`Result`] alias
//! used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use cdc_publisher::{Error, Result};
//!
//! fn lookup_partitions(topic: &str) -> Result<i32> {
//!     Err(Error::BrokerMetadata {
//!         topic: topic.to_string(),
//!         message: "broker unreachable".to_string(),
//!     })
//! }
//!
//! match lookup_partitions("orders") {
//!     Ok(count) => println!("{} partitions", count),
//!     Err(Error::BrokerMetadata { topic, .. }) => eprintln!("no metadata for {}", topic),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// The main error type for cdc-publisher operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from the config file, environment or validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka client error outside of a single record's delivery.
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from checkpoint file operations or the input source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Partition-count lookup for a topic failed. Always fatal.
    #[error("Metadata lookup for topic '{topic}' failed: {message}")]
    BrokerMetadata {
        /// Topic whose metadata was requested
        topic: String,
        /// Broker-reported reason
        message: String,
    },

    /// A record could not be delivered.
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// The publishing queue was closed while a producer or the worker was waiting on it.
    #[error("Publishing queue interrupted")]
    QueueInterrupted,

    /// A change event in the input could not be decoded.
    #[error("Invalid change event: {message}")]
    InvalidEvent {
        /// Description of what was invalid
        message: String,
    },

    /// Operation timeout.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },

    /// Graceful shutdown was requested (e.g., via Ctrl+C).
    #[error("Shutdown requested")]
    Shutdown,
}

/// Failure reported by a broker client for a single record.
#[derive(Error, Debug)]
pub enum SendError {
    /// The serialized record exceeds the broker's maximum message size.
    #[error("Record too large: {0}")]
    RecordTooLarge(String),

    /// The broker client was already closed.
    #[error("Producer is closed")]
    Closed,

    /// Delivery failure reported by librdkafka.
    #[error("{0}")]
    Kafka(#[from] KafkaError),

    /// Delivery failure from a non-Kafka broker client.
    #[error("{kind}: {message}")]
    Broker {
        /// Short, stable name of the failure
        kind: String,
        /// Broker-reported reason
        message: String,
    },
}

impl SendError {
    /// Short name of the failure, used in logs and dead-letter records.
    pub fn kind(&self) -> String {
        match self {
            SendError::RecordTooLarge(_) => "RecordTooLarge".to_string(),
            SendError::Closed => "ProducerClosed".to_string(),
            SendError::Kafka(e) => match e.rdkafka_error_code() {
                Some(code) => format!("{:?}", code),
                None => "KafkaError".to_string(),
            },
            SendError::Broker { kind, .. } => kind.clone(),
        }
    }

    /// Whether the broker rejected the record for exceeding its size limit.
    pub fn is_record_too_large(&self) -> bool {
        match self {
            SendError::RecordTooLarge(_) => true,
            SendError::Kafka(e) => {
                e.rdkafka_error_code() == Some(RDKafkaErrorCode::MessageSizeTooLarge)
            }
            _ => false,
        }
    }

    /// Whether the local producer queue was full at submission time.
    pub fn is_queue_full(&self) -> bool {
        matches!(
            self,
            SendError::Kafka(e) if e.rdkafka_error_code() == Some(RDKafkaErrorCode::QueueFull)
        )
    }
}

/// A convenient Result type alias for cdc-publisher operations.
///
/// This is equivalent to `std::result::Result<T, cdc_publisher::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
