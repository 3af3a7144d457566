//! Entries, write metadata and change records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata of the last write to a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Identity of the last writer
    pub writer: String,

    /// When the last write happened
    pub timestamp: DateTime<Utc>,

    /// Value the key held before the last write
    #[serde(default)]
    pub previous_value: Option<Value>,
}

/// A stored value together with its write metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    pub metadata: EntryMetadata,
}

/// Kind of workspace mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Set,
    Delete,
    Clear,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChangeOp::Set => "set",
            ChangeOp::Delete => "delete",
            ChangeOp::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// One entry of the workspace change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub key: String,
    pub operation: ChangeOp,
    pub writer: String,
    pub timestamp: DateTime<Utc>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl ChangeRecord {
    pub(crate) fn new(
        key: impl Into<String>,
        operation: ChangeOp,
        writer: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Self {
        Self {
            key: key.into(),
            operation,
            writer: writer.into(),
            timestamp: Utc::now(),
            old_value,
            new_value,
        }
    }
}

/// Whether a `set` created the key or overwrote it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
}
