pub mod broker;
pub mod completion;
pub mod hash;
pub mod key;
pub mod partitioner;
pub mod producer;
pub mod record;
pub mod topic;
pub mod worker;


pub use broker::{
    BrokerClient, DeliveryCallback, DeliveryReport, DeliveryResult, Rejected, TopicMetadata,
};
pub use completion::{Classification, CompletionContext, CompletionHandler, PublishContext};
pub use hash::HashFunction;
pub use key::KeyFormat;
pub use partitioner::{PartitionBy, PartitionFallback, Partitioner};
pub use producer::KafkaBrokerClient;
pub use record::{BrokerRecord, RecordBuilder};
pub use topic::TopicTemplate;
pub use worker::{Worker, WorkerStatus};
