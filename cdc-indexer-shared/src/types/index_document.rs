//! Index document types.
//!
//! This module defines the document structure that is written to the search
//! engine, and the sync key it is derived from.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The unit of ordering and idempotence: one row of one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
    pub table: String,
    /// Primary key value; composite key components are escaped and joined with `:`.
    pub primary_key: String,
}

impl SyncKey {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
        }
    }

    /// The document id used in the search index: `{table}:{primary_key}`.
    ///
    /// Depends only on the row identity, so every replay of the same row
    /// addresses the same document.
    pub fn document_id(&self) -> String {
        format!("{}:{}", self.table, self.primary_key)
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.primary_key)
    }
}

/// Document representation for the search index.
///
/// A denormalized cache of one relational row. Upserts replace the whole
/// document, so `fields` holds every indexed column that was non-null in the
/// source row.
///
/// # Fields
///
/// - `document_id`: Stable id derived from the [`SyncKey`]
/// - `table`: Source table, used as the index discriminator
/// - `source_timestamp`: Source commit time in epoch milliseconds, if known
/// - `fields`: Translated column values, flattened into the document body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDocument {
    pub document_id: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<i64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IndexDocument {
    /// Create an empty document for the given key.
    ///
    /// # Example
    ///
    /// ```
    /// use cdc_indexer_shared::{IndexDocument, SyncKey};
    ///
    /// let doc = IndexDocument::new(&SyncKey::new("organizations", "1"), None)
    ///     .with_field("name", "Acme");
    /// assert_eq!(doc.document_id, "organizations:1");
    /// ```
    pub fn new(key: &SyncKey, source_timestamp: Option<i64>) -> Self {
        Self {
            document_id: key.document_id(),
            table: key.table.clone(),
            source_timestamp,
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
