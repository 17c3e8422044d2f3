//! Record key and dead-letter value encodings.

use crate::event::RowIdentity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// How a row's identity is encoded into the record key.
///
/// The same format is used for regular and dead-letter records so consumers
/// can correlate the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFormat {
    /// Hex SHA-256 digest over database, table and the ordered key values.
    #[default]
    Hash,
    /// JSON array `[database, table, [{column: value}, ...]]`.
    Array,
}

impl KeyFormat {
    pub fn encode(&self, identity: &RowIdentity) -> String {
        match self {
            KeyFormat::Hash => {
                let mut hasher = Sha256::new();
                hasher.update(identity.database.as_bytes());
                hasher.update([0u8]);
                hasher.update(identity.table_name().as_bytes());
                for column in &identity.primary_key {
                    hasher.update([0u8]);
                    hasher.update(column.value.to_string().as_bytes());
                }
                hex::encode(hasher.finalize())
            }
            KeyFormat::Array => {
                let columns: Vec<Value> = identity
                    .primary_key
                    .iter()
                    .map(|c| {
                        let mut column = Map::new();
                        column.insert(c.name.clone(), c.value.clone());
                        Value::Object(column)
                    })
                    .collect();
                json!([identity.database, identity.table, columns]).to_string()
            }
        }
    }
}

/// Value of a dead-letter record: the row identity plus the failure kind.
pub fn fallback_value(identity: &RowIdentity, reason: &str) -> String {
    let data: Map<String, Value> = identity
        .primary_key
        .iter()
        .map(|c| (c.name.clone(), c.value.clone()))
        .collect();

    json!({
        "database": identity.database,
        "table": identity.table,
        "data": data,
        "fallback_reason": reason,
    })
    .to_string()
}
