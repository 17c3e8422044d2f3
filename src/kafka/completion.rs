//! Delivery outcome handling.
//!
//! Every send attempt carries a [`CompletionHandler`]. On success it marks
//! the event completed. On failure it classifies the error: fatal errors
//! terminate the process, non-fatal ones either complete the event or
//! redirect it once to the dead-letter topic. The dead-letter attempt gets a
//! context without a dead-letter topic, so it can never redirect again.

use crate::checkpoint::Completer;
use crate::error::SendError;
use crate::event::{Position, RowIdentity};
use crate::kafka::broker::{BrokerClient, DeliveryCallback, DeliveryResult, Rejected};
use crate::kafka::record::RecordBuilder;
use crate::kafka::topic::TopicTemplate;
use crate::lifecycle::Terminator;
use crate::metrics::ProducerMetrics;
use crate::Error;
use std::sync::Arc;
use tracing::{debug, error};

/// How a failed delivery is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The record exceeded the broker's message size limit.
    Oversized,
    /// Any other failure, tolerated because producer errors are configured as ignorable.
    Ignorable,
    Fatal,
}

impl Classification {
    pub fn of(error: &SendError, ignore_producer_errors: bool) -> Self {
        if error.is_record_too_large() {
            Classification::Oversized
        } else if ignore_producer_errors {
            Classification::Ignorable
        } else {
            Classification::Fatal
        }
    }

    pub fn is_fatal(&self) -> bool {
        *self == Classification::Fatal
    }
}

/// State shared by all in-flight records of one publisher.
pub struct PublishContext {
    pub metrics: Arc<ProducerMetrics>,
    pub fallback_topic: Option<TopicTemplate>,
    pub ignore_producer_errors: bool,
    pub client: Arc<dyn BrokerClient>,
    pub builder: Arc<RecordBuilder>,
    pub terminator: Arc<dyn Terminator>,
}

impl PublishContext {
    /// Submits a dead-letter record for `identity` to `topic`.
    pub fn send_fallback(
        &self,
        topic: &TopicTemplate,
        identity: &RowIdentity,
        reason: &SendError,
        callback: Box<dyn DeliveryCallback>,
    ) -> Result<(), Rejected> {
        let record = self.builder.build_fallback(topic, identity, &reason.kind());
        debug!(
            topic = %record.topic,
            row = %identity,
            "Publishing dead-letter record"
        );
        self.client.send(record, callback)
    }
}

/// Per-attempt values. A dead-letter attempt derives a new context rather
/// than changing the original.
#[derive(Clone)]
pub struct CompletionContext {
    pub position: Position,
    pub identity: RowIdentity,
    pub key: String,
    /// Serialized value, kept only while debug logging is enabled.
    pub value: Option<String>,
    pub fallback_topic: Option<TopicTemplate>,
    pub publish: Arc<PublishContext>,
}

impl CompletionContext {
    pub fn new(
        position: Position,
        identity: RowIdentity,
        key: String,
        value: Option<String>,
        publish: Arc<PublishContext>,
    ) -> Self {
        Self {
            position,
            identity,
            key,
            value,
            fallback_topic: publish.fallback_topic.clone(),
            publish,
        }
    }

    pub fn without_fallback_topic(&self) -> Self {
        Self {
            fallback_topic: None,
            ..self.clone()
        }
    }
}

/// Delivery callback for one send attempt.
pub struct CompletionHandler {
    context: CompletionContext,
    completer: Completer,
}

impl CompletionHandler {
    pub fn new(context: CompletionContext, completer: Completer) -> Self {
        Self { context, completer }
    }

    pub fn context(&self) -> &CompletionContext {
        &self.context
    }

    fn on_success(self, partition: i32, offset: i64) {
        let ctx = &self.context;
        ctx.publish.metrics.record_success();

        debug!(
            key = %ctx.key,
            partition,
            offset,
            position = %ctx.position,
            "-> record delivered"
        );
        if let Some(value) = &ctx.value {
            debug!("   {}", value);
        }

        self.completer.mark_completed();
    }

    fn on_failure(self, err: SendError) {
        let publish = self.context.publish.clone();
        publish.metrics.record_failure();

        error!(
            kind = %err.kind(),
            position = %self.context.position,
            row = %self.context.identity,
            "Failed to publish record"
        );
        error!("{}", err);

        match Classification::of(&err, publish.ignore_producer_errors) {
            Classification::Fatal => publish.terminator.terminate(Error::Send(err)),
            _ => match self.context.fallback_topic.clone() {
                None => self.completer.mark_completed(),
                Some(topic) => self.publish_fallback(&topic, err),
            },
        }
    }

    fn publish_fallback(self, topic: &TopicTemplate, reason: SendError) {
        let publish = self.context.publish.clone();
        let identity = self.context.identity.clone();
        let fallback = Box::new(CompletionHandler {
            context: self.context.without_fallback_topic(),
            completer: self.completer,
        });

        if let Err(rejected) = publish.send_fallback(topic, &identity, &reason, fallback) {
            rejected.fail();
        }
    }
}

impl DeliveryCallback for CompletionHandler {
    fn on_delivery(self: Box<Self>, result: DeliveryResult) {
        let handler = *self;
        match result {
            Ok(report) => handler.on_success(report.partition, report.offset),
            Err(err) => handler.on_failure(err),
        }
    }
}
