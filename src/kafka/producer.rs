use crate::config::KafkaConfig;
use crate::error::SendError;
use crate::kafka::broker::{
    BrokerClient, DeliveryCallback, DeliveryReport, Rejected, TopicMetadata,
};
use crate::kafka::record::BrokerRecord;
use crate::{Error, Result};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument, warn};

/// [`BrokerClient`] backed by an rdkafka [`FutureProducer`].
///
/// Delivery futures are awaited on the runtime the client was created on,
/// and each outcome is passed to the record's callback from there.
pub struct KafkaBrokerClient {
    producer: RwLock<Option<FutureProducer>>,
    runtime: Handle,
    metadata_timeout: Duration,
    close_timeout: Duration,
}

impl KafkaBrokerClient {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = config.client_config().create()?;
        info!(brokers = ?config.brokers, "Kafka producer created");

        Ok(Self {
            producer: RwLock::new(Some(producer)),
            runtime: Handle::current(),
            metadata_timeout: config.metadata_timeout(),
            close_timeout: config.close_timeout(),
        })
    }

    fn producer(&self) -> Option<FutureProducer> {
        self.producer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TopicMetadata for KafkaBrokerClient {
    #[instrument(skip(self))]
    fn partition_count(&self, topic: &str) -> Result<i32> {
        let producer = self.producer().ok_or_else(|| Error::BrokerMetadata {
            topic: topic.to_string(),
            message: "producer is closed".to_string(),
        })?;

        let metadata = producer
            .client()
            .fetch_metadata(Some(topic), self.metadata_timeout)
            .map_err(|e| {
                error!("Failed to fetch metadata for topic '{}': {}", topic, e);
                Error::BrokerMetadata {
                    topic: topic.to_string(),
                    message: e.to_string(),
                }
            })?;

        // Topics the broker has not created yet come back without partitions.
        let count = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .map(|t| t.partitions().len() as i32)
            .unwrap_or(0);
        Ok(count.max(1))
    }
}

impl BrokerClient for KafkaBrokerClient {
    fn send(
        &self,
        record: BrokerRecord,
        callback: Box<dyn DeliveryCallback>,
    ) -> std::result::Result<(), Rejected> {
        let Some(producer) = self.producer() else {
            return Err(Rejected {
                error: SendError::Closed,
                record,
                callback,
            });
        };

        let mut future_record = FutureRecord::to(&record.topic)
            .key(record.key.as_str())
            .payload(record.value.as_str());
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }

        let delivery = match producer.send_result(future_record).map_err(|(e, _)| e) {
            Ok(delivery) => delivery,
            Err(e) => {
                return Err(Rejected {
                    error: SendError::Kafka(e),
                    record,
                    callback,
                })
            }
        };

        self.runtime.spawn(async move {
            let result = match delivery.await {
                Ok(Ok((partition, offset))) => Ok(DeliveryReport { partition, offset }),
                Ok(Err((e, _message))) => Err(SendError::Kafka(e)),
                Err(_canceled) => Err(SendError::Closed),
            };
            callback.on_delivery(result);
        });
        Ok(())
    }

    fn close(&self) {
        let producer = self
            .producer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(producer) = producer {
            debug!("Flushing Kafka producer");
            if let Err(e) = producer.flush(self.close_timeout) {
                warn!("Kafka producer flush did not complete: {}", e);
            }
            info!("Kafka producer closed");
        }
    }
}
