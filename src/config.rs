use crate::kafka::{HashFunction, KeyFormat, PartitionBy, PartitionFallback, Partitioner};
use crate::{Error, Result};
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_buffering_max_kbytes")]
    pub queue_buffering_max_kbytes: usize,
    #[serde(default = "default_message_max_bytes")]
    pub message_max_bytes: usize,
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Extra librdkafka properties, applied last.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Which part of a row decides its partition, as spelled in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKeyKind {
    #[default]
    Database,
    Table,
    PrimaryKey,
    Column,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// Topic for row events; may contain `%{database}` and `%{table}`.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Topic for schema changes; defaults to `topic`.
    #[serde(default)]
    pub schema_topic: Option<String>,
    /// Where non-fatally failed records are redirected. Unset drops them.
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
    #[serde(default)]
    pub partition_by: PartitionKeyKind,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub partition_fallback: PartitionFallback,
    #[serde(default)]
    pub partition_hash: HashFunction,
    #[serde(default)]
    pub key_format: KeyFormat,
    /// Treat every producer error as non-fatal.
    #[serde(default)]
    pub ignore_producer_errors: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_file")]
    pub file: PathBuf,
    #[serde(default = "default_checkpoint_interval_secs")]
    pub interval_secs: u64,
}

impl Config {
    /// Loads `path`, overlaid with `CDC_PUBLISHER_*` environment variables
    /// (`__` separates nested keys, e.g. `CDC_PUBLISHER_PRODUCER__TOPIC`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("CDC_PUBLISHER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.is_empty() {
            return Err(Error::Config("kafka.brokers must not be empty".to_string()));
        }
        if self.producer.queue_capacity == 0 {
            return Err(Error::Config(
                "producer.queue_capacity must be positive".to_string(),
            ));
        }
        self.producer.partitioner().map(|_| ())
    }
}

impl KafkaConfig {
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("compression.type", &self.compression)
            .set("acks", &self.acks)
            .set("linger.ms", self.linger_ms.to_string())
            .set("batch.size", self.batch_size.to_string())
            .set(
                "queue.buffering.max.kbytes",
                self.queue_buffering_max_kbytes.to_string(),
            )
            .set("message.max.bytes", self.message_max_bytes.to_string());

        for (key, value) in &self.properties {
            client_config.set(key, value);
        }
        client_config
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl ProducerConfig {
    pub fn schema_topic(&self) -> &str {
        self.schema_topic.as_deref().unwrap_or(&self.topic)
    }

    pub fn partitioner(&self) -> Result<Partitioner> {
        let by = match self.partition_by {
            PartitionKeyKind::Database => PartitionBy::Database,
            PartitionKeyKind::Table => PartitionBy::Table,
            PartitionKeyKind::PrimaryKey => PartitionBy::PrimaryKey,
            PartitionKeyKind::Column => {
                if self.partition_columns.is_empty() {
                    return Err(Error::Config(
                        "producer.partition_columns is required when partition_by = \"column\""
                            .to_string(),
                    ));
                }
                PartitionBy::Columns(self.partition_columns.clone())
            }
        };
        Ok(Partitioner::new(
            self.partition_hash,
            by,
            self.partition_fallback,
        ))
    }

    pub fn schema_partitioner(&self) -> Partitioner {
        Partitioner::for_schema_changes(self.partition_hash)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            schema_topic: None,
            dead_letter_topic: None,
            partition_by: PartitionKeyKind::default(),
            partition_columns: Vec::new(),
            partition_fallback: PartitionFallback::default(),
            partition_hash: HashFunction::default(),
            key_format: KeyFormat::default(),
            ignore_producer_errors: false,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            file: default_checkpoint_file(),
            interval_secs: default_checkpoint_interval_secs(),
        }
    }
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    100
}

fn default_batch_size() -> usize {
    16384
}

fn default_queue_buffering_max_kbytes() -> usize {
    32_768 // 32MB
}

fn default_message_max_bytes() -> usize {
    1_000_000
}

fn default_metadata_timeout_ms() -> u64 {
    5_000
}

fn default_close_timeout_ms() -> u64 {
    30_000
}

fn default_topic() -> String {
    "maxwell".to_string()
}

fn default_queue_capacity() -> usize {
    100
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("checkpoint.json")
}

fn default_checkpoint_interval_secs() -> u64 {
    10
}
