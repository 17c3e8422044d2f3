//! Captured change events, as handed to the publisher by the replication reader.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Position in the replication stream.
///
/// Positions are totally ordered: first by log file name (zero-padded, so
/// lexical order matches log order), then by offset within the file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub file: String,
    pub offset: u64,
}

impl Position {
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}

/// One primary-key column of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyColumn {
    pub name: String,
    pub value: Value,
}

/// Identity of the row a change event refers to.
///
/// `table` is absent for database-level schema changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIdentity {
    pub database: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub primary_key: Vec<KeyColumn>,
}

impl RowIdentity {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: Some(table.into()),
            primary_key: Vec::new(),
        }
    }

    /// Identity of a database-level event with no table.
    pub fn database_only(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: None,
            primary_key: Vec::new(),
        }
    }

    pub fn with_key_column(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.primary_key.push(KeyColumn {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or("")
    }

    /// Looks up a primary-key column value by name.
    pub fn key_value(&self, column: &str) -> Option<&Value> {
        self.primary_key
            .iter()
            .find(|c| c.name == column)
            .map(|c| &c.value)
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table_name())?;
        if !self.primary_key.is_empty() {
            let pk: Vec<String> = self
                .primary_key
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect();
            write!(f, " [{}]", pk.join(", "))?;
        }
        Ok(())
    }
}

/// An immutable captured row mutation or schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    position: Position,
    identity: RowIdentity,
    payload: String,
    #[serde(default)]
    schema_change: bool,
    #[serde(default)]
    topic: Option<String>,
}

impl ChangeEvent {
    /// A row-data event with an already serialized payload.
    pub fn row(position: Position, identity: RowIdentity, payload: impl Into<String>) -> Self {
        Self {
            position,
            identity,
            payload: payload.into(),
            schema_change: false,
            topic: None,
        }
    }

    /// A DDL event with an already serialized payload.
    pub fn schema_change(
        position: Position,
        identity: RowIdentity,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            position,
            identity,
            payload: payload.into(),
            schema_change: true,
            topic: None,
        }
    }

    /// Routes this event to `topic` regardless of the configured template.
    pub fn with_topic_override(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn identity(&self) -> &RowIdentity {
        &self.identity
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_schema_change(&self) -> bool {
        self.schema_change
    }

    pub fn topic_override(&self) -> Option<&str> {
        self.topic.as_deref()
    }
}
