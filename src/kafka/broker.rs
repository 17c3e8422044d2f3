//! The boundary between the publishing engine and a broker client.
//!
//! A [`BrokerClient`] accepts records and reports each outcome later, on its
//! own threads, through the [`DeliveryCallback`] handed over with the record.

use crate::error::SendError;
use crate::kafka::record::BrokerRecord;
use crate::Result;

/// Acknowledgment for a delivered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub partition: i32,
    pub offset: i64,
}

pub type DeliveryResult = std::result::Result<DeliveryReport, SendError>;

/// Invoked exactly once per submitted record with its outcome.
pub trait DeliveryCallback: Send + 'static {
    fn on_delivery(self: Box<Self>, result: DeliveryResult);
}

/// A record the client refused synchronously. Ownership of the record and
/// its callback goes back to the caller, which decides what to do next.
pub struct Rejected {
    pub error: SendError,
    pub record: BrokerRecord,
    pub callback: Box<dyn DeliveryCallback>,
}

impl Rejected {
    /// Reports the rejection through the record's own callback.
    pub fn fail(self) {
        self.callback.on_delivery(Err(self.error));
    }
}

impl std::fmt::Debug for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("topic", &self.record.topic)
            .finish()
    }
}

/// Topic metadata queries.
pub trait TopicMetadata {
    /// Number of partitions of `topic`, queried from the broker on every call.
    /// A topic the broker has no metadata for counts as one partition.
    fn partition_count(&self, topic: &str) -> Result<i32>;
}

pub trait BrokerClient: TopicMetadata + Send + Sync + 'static {
    /// Queues `record` for delivery. Only refusals that happen before the
    /// record is queued are returned here; everything else goes to `callback`.
    fn send(
        &self,
        record: BrokerRecord,
        callback: Box<dyn DeliveryCallback>,
    ) -> std::result::Result<(), Rejected>;

    /// Flushes outstanding records best-effort and releases the connection.
    /// Idempotent; later sends are rejected with [`SendError::Closed`].
    fn close(&self);
}
