use crate::event::{ChangeEvent, RowIdentity};
use crate::kafka::broker::TopicMetadata;
use crate::kafka::key::{fallback_value, KeyFormat};
use crate::kafka::partitioner::Partitioner;
use crate::kafka::topic::TopicTemplate;
use crate::Result;

/// A broker-addressed record, built fresh for every send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    /// `None` leaves placement to the broker client's own partitioner.
    pub partition: Option<i32>,
    pub key: String,
    pub value: String,
}

/// Turns change events into broker records.
#[derive(Debug)]
pub struct RecordBuilder {
    topic: TopicTemplate,
    schema_topic: TopicTemplate,
    partitioner: Partitioner,
    schema_partitioner: Partitioner,
    key_format: KeyFormat,
}

impl RecordBuilder {
    pub fn new(
        topic: TopicTemplate,
        schema_topic: TopicTemplate,
        partitioner: Partitioner,
        schema_partitioner: Partitioner,
        key_format: KeyFormat,
    ) -> Self {
        Self {
            topic,
            schema_topic,
            partitioner,
            schema_partitioner,
            key_format,
        }
    }

    pub fn key_format(&self) -> KeyFormat {
        self.key_format
    }

    /// Resolves topic and partition for `event`. Fails with
    /// [`crate::Error::BrokerMetadata`] if the partition count is unavailable.
    pub fn build<M>(&self, event: &ChangeEvent, metadata: &M) -> Result<BrokerRecord>
    where
        M: TopicMetadata + ?Sized,
    {
        let identity = event.identity();

        let (topic, partitioner) = if event.is_schema_change() {
            (
                self.schema_topic.resolve(identity).into_owned(),
                &self.schema_partitioner,
            )
        } else {
            let topic = match event.topic_override() {
                Some(topic) => topic.to_string(),
                None => self.topic.resolve(identity).into_owned(),
            };
            (topic, &self.partitioner)
        };

        let partition_count = metadata.partition_count(&topic)?;
        let partition = partitioner.partition(event, partition_count);

        Ok(BrokerRecord {
            topic,
            partition: Some(partition),
            key: self.key_format.encode(identity),
            value: event.payload().to_string(),
        })
    }

    /// Dead-letter record for a row whose delivery failed with `reason`.
    pub fn build_fallback(
        &self,
        topic: &TopicTemplate,
        identity: &RowIdentity,
        reason: &str,
    ) -> BrokerRecord {
        BrokerRecord {
            topic: topic.resolve(identity).into_owned(),
            partition: None,
            key: self.key_format.encode(identity),
            value: fallback_value(identity, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Position;
    use crate::kafka::hash::HashFunction;
    use crate::kafka::partitioner::{PartitionBy, PartitionFallback};
    use crate::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Partition counts per topic; unknown topics have one partition.
    #[derive(Default)]
    struct StaticMetadata {
        partitions: HashMap<String, i32>,
        failing: bool,
        lookups: Mutex<Vec<String>>,
    }

    impl StaticMetadata {
        fn with_topic(mut self, topic: &str, partitions: i32) -> Self {
            self.partitions.insert(topic.to_string(), partitions);
            self
        }
    }

    impl TopicMetadata for StaticMetadata {
        fn partition_count(&self, topic: &str) -> Result<i32> {
            self.lookups.lock().unwrap().push(topic.to_string());
            if self.failing {
                return Err(Error::BrokerMetadata {
                    topic: topic.to_string(),
                    message: "broker down".to_string(),
                });
            }
            Ok(self.partitions.get(topic).copied().unwrap_or(1))
        }
    }

    fn builder(topic: &str, schema_topic: &str, by: PartitionBy) -> RecordBuilder {
        RecordBuilder::new(
            TopicTemplate::new(topic),
            TopicTemplate::new(schema_topic),
            Partitioner::new(HashFunction::Default, by, PartitionFallback::Zero),
            Partitioner::for_schema_changes(HashFunction::Default),
            KeyFormat::Array,
        )
    }

    fn users_event() -> ChangeEvent {
        ChangeEvent::row(
            Position::new("mysql-bin.000001", 4),
            RowIdentity::new("shop", "users").with_key_column("id", 5),
            r#"{"id":5,"name":"Ada"}"#,
        )
    }

    #[test]
    fn test_build_row_record() {
        let metadata = StaticMetadata::default().with_topic("shop.users", 4);
        let builder = builder("%{database}.%{table}", "ddl", PartitionBy::Table);

        let record = builder.build(&users_event(), &metadata).unwrap();

        assert_eq!(record.topic, "shop.users");
        assert_eq!(record.partition, Some(HashFunction::Default.partition("users", 4)));
        assert_eq!(record.key, r#"["shop","users",[{"id":5}]]"#);
        assert_eq!(record.value, r#"{"id":5,"name":"Ada"}"#);
    }

    #[test]
    fn test_topic_override_ignores_template() {
        let metadata = StaticMetadata::default();
        let builder = builder("%{database}.%{table}", "ddl", PartitionBy::Table);
        let event = users_event().with_topic_override("vip_users");

        let record = builder.build(&event, &metadata).unwrap();

        assert_eq!(record.topic, "vip_users");
        assert_eq!(*metadata.lookups.lock().unwrap(), vec!["vip_users".to_string()]);
    }

    #[test]
    fn test_plain_topic_is_used_verbatim() {
        let metadata = StaticMetadata::default();
        let builder = builder("maxwell", "ddl", PartitionBy::Database);

        let record = builder.build(&users_event(), &metadata).unwrap();
        assert_eq!(record.topic, "maxwell");
        assert_eq!(record.partition, Some(0));
    }

    #[test]
    fn test_schema_change_uses_schema_topic_and_partitioner() {
        let metadata = StaticMetadata::default().with_topic("events_shop", 6);
        // Main partitioner keyed on a column a DDL event never has.
        let builder = builder(
            "rows",
            "events_%{database}",
            PartitionBy::Columns(vec!["id".to_string()]),
        );
        let event = ChangeEvent::schema_change(
            Position::new("mysql-bin.000002", 77),
            RowIdentity::new("shop", "orders"),
            r#"{"sql":"ALTER TABLE orders ADD note TEXT"}"#,
        );

        let record = builder.build(&event, &metadata).unwrap();

        assert_eq!(record.topic, "events_shop");
        assert_eq!(record.partition, Some(HashFunction::Default.partition("orders", 6)));
    }

    #[test]
    fn test_metadata_failure_propagates() {
        let metadata = StaticMetadata {
            failing: true,
            ..Default::default()
        };
        let builder = builder("maxwell", "ddl", PartitionBy::Database);

        let err = builder.build(&users_event(), &metadata).unwrap_err();
        assert!(matches!(err, Error::BrokerMetadata { ref topic, .. } if topic == "maxwell"));
    }

    #[test]
    fn test_build_fallback_record() {
        let builder = builder("maxwell", "ddl", PartitionBy::Database);
        let identity = RowIdentity::new("shop", "users").with_key_column("id", 5);

        let record = builder.build_fallback(&TopicTemplate::new("dlq_%{database}"), &identity, "RecordTooLarge");

        assert_eq!(record.topic, "dlq_shop");
        assert_eq!(record.partition, None);
        assert_eq!(record.key, r#"["shop","users",[{"id":5}]]"#);
        assert!(record.value.contains(r#""fallback_reason":"RecordTooLarge""#));
    }
}
