use crate::event::{ChangeEvent, RowIdentity};
use crate::kafka::hash::HashFunction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// What part of a row's identity decides its partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionBy {
    Database,
    Table,
    /// All primary-key values, in key order.
    PrimaryKey,
    /// The named primary-key columns, in the given order.
    Columns(Vec<String>),
}

/// Where events go when the partition key resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFallback {
    /// Always partition 0.
    Zero,
    /// Hash the database name instead.
    #[default]
    Database,
    /// Hash the table name instead.
    Table,
    /// Spread over all partitions in turn. Gives up per-key ordering.
    RoundRobin,
}

#[derive(Debug)]
pub struct Partitioner {
    hash: HashFunction,
    by: PartitionBy,
    fallback: PartitionFallback,
    round_robin: AtomicU64,
}

impl Partitioner {
    pub fn new(hash: HashFunction, by: PartitionBy, fallback: PartitionFallback) -> Self {
        Self {
            hash,
            by,
            fallback,
            round_robin: AtomicU64::new(0),
        }
    }

    /// The fixed partitioner for schema-change events: by table, falling back
    /// to the database for database-level statements.
    pub fn for_schema_changes(hash: HashFunction) -> Self {
        Self::new(hash, PartitionBy::Table, PartitionFallback::Database)
    }

    pub fn partition_by(&self) -> &PartitionBy {
        &self.by
    }

    /// Resolves the configured partition key, `None` when it is empty or absent.
    pub fn partition_key(&self, identity: &RowIdentity) -> Option<String> {
        let key = match &self.by {
            PartitionBy::Database => Some(identity.database.clone()),
            PartitionBy::Table => identity.table.clone(),
            PartitionBy::PrimaryKey => {
                let columns: Vec<&str> = identity
                    .primary_key
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect();
                extract_composite_key(identity, &columns)
            }
            PartitionBy::Columns(columns) => {
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                extract_composite_key(identity, &columns)
            }
        };
        key.filter(|k| !k.is_empty())
    }

    pub fn partition(&self, event: &ChangeEvent, partition_count: i32) -> i32 {
        let identity = event.identity();
        match self.partition_key(identity) {
            Some(key) => self.hash.partition(&key, partition_count),
            None => self.fallback_partition(identity, partition_count),
        }
    }

    fn fallback_partition(&self, identity: &RowIdentity, partition_count: i32) -> i32 {
        match self.fallback {
            PartitionFallback::Zero => 0,
            PartitionFallback::Database => self.hash.partition(&identity.database, partition_count),
            PartitionFallback::Table => self.hash.partition(identity.table_name(), partition_count),
            PartitionFallback::RoundRobin => {
                if partition_count <= 1 {
                    return 0;
                }
                let turn = self.round_robin.fetch_add(1, Ordering::Relaxed);
                (turn % partition_count as u64) as i32
            }
        }
    }
}

fn value_to_key_part(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn extract_composite_key(identity: &RowIdentity, columns: &[&str]) -> Option<String> {
    let mut key_parts = Vec::with_capacity(columns.len());

    for column in columns {
        match identity.key_value(column).and_then(value_to_key_part) {
            Some(part) => key_parts.push(part),
            None => {
                debug!("Missing column '{}' for partition key of {}", column, identity);
                return None;
            }
        }
    }

    if key_parts.is_empty() {
        None
    } else {
        Some(key_parts.join(":"))
    }
}
