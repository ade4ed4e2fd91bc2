//! Change envelope types and decoding.
//!
//! A change envelope wraps one row-level change captured from the database of
//! record. The wire format is the Debezium JSON envelope:
//!
//! ```json
//! {
//!   "payload": {
//!     "op": "u",
//!     "before": { "id": 5, "title": "Engineer" },
//!     "after": { "id": 5, "title": "Senior Engineer" },
//!     "source": { "table": "jobs", "ts_ms": 1718000000000 },
//!     "ts_ms": 1718000000123
//!   }
//! }
//! ```

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while decoding a raw message into a [`ChangeEnvelope`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The payload cannot be decoded or violates the before/after invariant.
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// The payload carries an operation code the indexer does not handle.
    #[error("Unsupported operation code: {0}")]
    UnsupportedOperation(String),
}

impl EnvelopeError {
    /// Create a malformed envelope error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// The kind of change carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Row inserted (`c`).
    Create,
    /// Row updated (`u`).
    Update,
    /// Row deleted (`d`).
    Delete,
    /// Row read during the initial snapshot (`r`).
    SnapshotRead,
}

impl OpCode {
    /// Parse a wire operation code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(Self::Create),
            "u" => Some(Self::Update),
            "d" => Some(Self::Delete),
            "r" => Some(Self::SnapshotRead),
            _ => None,
        }
    }

    /// The wire operation code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Create => "c",
            Self::Update => "u",
            Self::Delete => "d",
            Self::SnapshotRead => "r",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::SnapshotRead => "snapshot_read",
        };
        f.write_str(name)
    }
}

/// Column values of one table row at one instant, in source column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowImage(Map<String, Value>);

impl RowImage {
    /// Create an empty row image.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style column insertion.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Get the value of a column, treating JSON `null` as absent.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|v| !v.is_null())
    }

    /// Render a column as a document key component.
    ///
    /// Only strings, integers, floats and booleans qualify. Empty strings and
    /// nulls do not.
    pub fn key_component(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

}

impl From<Map<String, Value>> for RowImage {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A decoded change event.
///
/// Constructed once per inbound message and discarded after dispatch.
/// Invariant: `Delete` carries only `before`; `Create` and `SnapshotRead`
/// carry only `after`; `Update` carries `after` and, when the source emits
/// it, `before`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEnvelope {
    pub operation: OpCode,
    pub table: String,
    pub before: Option<RowImage>,
    pub after: Option<RowImage>,
    /// Source commit time in epoch milliseconds, `None` when the source
    /// omits it.
    pub source_timestamp: Option<i64>,
}

#[derive(Deserialize)]
struct WireEnvelope {
    payload: Option<WirePayload>,
}

#[derive(Deserialize)]
struct WirePayload {
    op: Option<String>,
    before: Option<Value>,
    after: Option<Value>,
    source: Option<WireSource>,
    ts_ms: Option<i64>,
}

#[derive(Deserialize)]
struct WireSource {
    table: Option<String>,
    ts_ms: Option<i64>,
}

impl ChangeEnvelope {
    /// Build an envelope, enforcing the before/after invariant.
    ///
    /// Row images the operation does not use are dropped.
    pub fn new(
        operation: OpCode,
        table: impl Into<String>,
        before: Option<RowImage>,
        after: Option<RowImage>,
        source_timestamp: Option<i64>,
    ) -> Result<Self, EnvelopeError> {
        let table = table.into();
        if table.is_empty() {
            return Err(EnvelopeError::malformed("table name is empty"));
        }

        let (before, after) = match operation {
            OpCode::Create | OpCode::SnapshotRead => (None, after),
            OpCode::Update => (before, after),
            OpCode::Delete => (before, None),
        };

        match operation {
            OpCode::Create | OpCode::Update | OpCode::SnapshotRead if after.is_none() => {
                Err(EnvelopeError::malformed(format!(
                    "{} envelope for table '{}' has no after image",
                    operation, table
                )))
            }
            OpCode::Delete if before.is_none() => Err(EnvelopeError::malformed(format!(
                "delete envelope for table '{}' has no before image",
                table
            ))),
            _ => Ok(Self {
                operation,
                table,
                before,
                after,
                source_timestamp,
            }),
        }
    }

    /// Envelope for a row insert.
    pub fn create(table: impl Into<String>, after: RowImage, source_timestamp: i64) -> Self {
        Self {
            operation: OpCode::Create,
            table: table.into(),
            before: None,
            after: Some(after),
            source_timestamp: Some(source_timestamp),
        }
    }

    /// Envelope for a row update.
    pub fn update(
        table: impl Into<String>,
        before: Option<RowImage>,
        after: RowImage,
        source_timestamp: i64,
    ) -> Self {
        Self {
            operation: OpCode::Update,
            table: table.into(),
            before,
            after: Some(after),
            source_timestamp: Some(source_timestamp),
        }
    }

    /// Envelope for a row delete.
    pub fn delete(table: impl Into<String>, before: RowImage, source_timestamp: i64) -> Self {
        Self {
            operation: OpCode::Delete,
            table: table.into(),
            before: Some(before),
            after: None,
            source_timestamp: Some(source_timestamp),
        }
    }

    /// Envelope for a snapshot read.
    pub fn snapshot_read(table: impl Into<String>, after: RowImage, source_timestamp: i64) -> Self {
        Self {
            operation: OpCode::SnapshotRead,
            table: table.into(),
            before: None,
            after: Some(after),
            source_timestamp: Some(source_timestamp),
        }
    }

    /// Decode a raw broker payload.
    ///
    /// Unknown fields are ignored. Fails with [`EnvelopeError::Malformed`] when
    /// the payload is not a JSON envelope, lacks `payload.op` or
    /// `payload.source.table`, or misses the row image its operation needs.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| EnvelopeError::malformed(format!("invalid JSON envelope: {}", e)))?;

        let payload = wire
            .payload
            .ok_or_else(|| EnvelopeError::malformed("missing payload"))?;

        let code = payload
            .op
            .ok_or_else(|| EnvelopeError::malformed("missing payload.op"))?;
        let operation = OpCode::from_code(&code)
            .ok_or_else(|| EnvelopeError::UnsupportedOperation(code.clone()))?;

        let table = payload
            .source
            .as_ref()
            .and_then(|source| source.table.clone())
            .ok_or_else(|| EnvelopeError::malformed("missing payload.source.table"))?;

        let before = Self::row_image("before", payload.before)?;
        let after = Self::row_image("after", payload.after)?;

        let source_timestamp = payload
            .source
            .and_then(|source| source.ts_ms)
            .or(payload.ts_ms);

        Self::new(operation, table, before, after, source_timestamp)
    }

    fn row_image(name: &str, value: Option<Value>) -> Result<Option<RowImage>, EnvelopeError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(RowImage::from(map))),
            Some(other) => Err(EnvelopeError::malformed(format!(
                "payload.{} must be an object, got {}",
                name,
                json_type(&other)
            ))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
