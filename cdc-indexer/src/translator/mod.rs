//! Entity translators.
//!
//! A translator maps one table's row image to a search document. Translators
//! are pure: the same row and timestamp always produce the same document and
//! the same document id.

mod event;
mod fields;
mod job;
mod organization;

pub use event::EventTranslator;
pub use fields::{translate_columns, Column, ColumnKind};
pub use job::JobTranslator;
pub use organization::OrganizationTranslator;

use std::collections::HashMap;
use std::sync::Arc;

use cdc_indexer_shared::{IndexDocument, RowImage, SyncKey};
use thiserror::Error;
use tracing::warn;

use crate::errors::IngestError;

/// Errors raised while translating a row image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Row for table '{table}' is missing primary key column '{column}'")]
    MissingPrimaryKey { table: String, column: String },

    #[error("Column '{column}' of table '{table}' is invalid: {reason}")]
    InvalidColumn {
        table: String,
        column: String,
        reason: String,
    },
}

impl From<TranslateError> for IngestError {
    fn from(err: TranslateError) -> Self {
        IngestError::MalformedEnvelope(err.to_string())
    }
}

/// Maps rows of one table to index documents.
pub trait EntityTranslator: Send + Sync {
    /// The table this translator is registered for.
    fn table(&self) -> &str;

    /// Primary key columns, in key order.
    fn primary_key(&self) -> &[&'static str] {
        &["id"]
    }

    /// Derive the sync key from a row.
    ///
    /// Composite keys are joined with `:`; each component has `\` and `:`
    /// escaped so distinct rows never share a key.
    fn sync_key(&self, row: &RowImage) -> Result<SyncKey, TranslateError> {
        let columns = self.primary_key();
        let mut components = Vec::with_capacity(columns.len());

        for column in columns {
            let component =
                row.key_component(column)
                    .ok_or_else(|| TranslateError::MissingPrimaryKey {
                        table: self.table().to_string(),
                        column: column.to_string(),
                    })?;
            components.push(component);
        }

        let primary_key = match components.as_slice() {
            [single] => single.clone(),
            _ => components
                .iter()
                .map(|c| escape_key_component(c))
                .collect::<Vec<_>>()
                .join(":"),
        };

        Ok(SyncKey::new(self.table(), primary_key))
    }

    /// The document id for a row.
    fn document_id(&self, row: &RowImage) -> Result<String, TranslateError> {
        Ok(self.sync_key(row)?.document_id())
    }

    /// Translate a row into the full document to index.
    fn translate(&self, row: &RowImage, source_timestamp: Option<i64>)
        -> Result<IndexDocument, TranslateError>;
}

fn escape_key_component(component: &str) -> String {
    component.replace('\\', "\\\\").replace(':', "\\:")
}

/// Translators keyed by table name.
#[derive(Default, Clone)]
pub struct TranslatorRegistry {
    translators: HashMap<String, Arc<dyn EntityTranslator>>,
}

impl TranslatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `organizations`, `jobs` and `events` translators.
    pub fn with_default_translators() -> Self {
        let mut registry = Self::new();
        registry.register(OrganizationTranslator);
        registry.register(JobTranslator);
        registry.register(EventTranslator);
        registry
    }

    /// Register a translator for its table, replacing any previous one.
    pub fn register(&mut self, translator: impl EntityTranslator + 'static) {
        let table = translator.table().to_string();
        if self
            .translators
            .insert(table.clone(), Arc::new(translator))
            .is_some()
        {
            warn!(table = %table, "Replaced translator");
        }
    }

    pub fn get(&self, table: &str) -> Option<&dyn EntityTranslator> {
        self.translators.get(table).map(|t| t.as_ref())
    }

    /// Registered table names, sorted.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.translators.keys().map(String::as_str).collect();
        tables.sort_unstable();
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MembershipTranslator;

    impl EntityTranslator for MembershipTranslator {
        fn table(&self) -> &str {
            "memberships"
        }

        fn primary_key(&self) -> &[&'static str] {
            &["organization_id", "user_id"]
        }

        fn translate(
            &self,
            row: &RowImage,
            source_timestamp: Option<i64>,
        ) -> Result<IndexDocument, TranslateError> {
            Ok(IndexDocument::new(&self.sync_key(row)?, source_timestamp))
        }
    }

    #[test]
    fn test_default_registry_tables() {
        let registry = TranslatorRegistry::with_default_translators();
        assert_eq!(registry.tables(), vec!["events", "jobs", "organizations"]);
        assert!(registry.get("audit_log").is_none());
        assert_eq!(registry.get("jobs").map(|t| t.table()), Some("jobs"));
    }

    #[test]
    fn test_composite_key_joins_components() {
        let row = RowImage::new()
            .with("organization_id", 7)
            .with("user_id", "u-9");
        let id = MembershipTranslator.document_id(&row).unwrap();
        assert_eq!(id, "memberships:7:u-9");
    }

    #[test]
    fn test_composite_key_components_are_escaped() {
        let first = RowImage::new()
            .with("organization_id", "a:b")
            .with("user_id", "c");
        let second = RowImage::new()
            .with("organization_id", "a")
            .with("user_id", "b:c");

        let first_id = MembershipTranslator.document_id(&first).unwrap();
        let second_id = MembershipTranslator.document_id(&second).unwrap();

        assert_ne!(first_id, second_id);
        assert_eq!(first_id, "memberships:a\\:b:c");
        assert_eq!(second_id, "memberships:a:b\\:c");
    }

    #[test]
    fn test_single_key_is_not_escaped() {
        let row = RowImage::new().with("id", "a:b");
        assert_eq!(
            OrganizationTranslator.document_id(&row).unwrap(),
            "organizations:a:b"
        );
    }

    #[test]
    fn test_missing_or_null_primary_key() {
        let row = RowImage::new().with("organization_id", 7).with("user_id", serde_json::Value::Null);
        let err = MembershipTranslator.sync_key(&row).unwrap_err();
        assert_eq!(
            err,
            TranslateError::MissingPrimaryKey {
                table: "memberships".to_string(),
                column: "user_id".to_string(),
            }
        );

        let ingest: IngestError = err.into();
        assert!(matches!(ingest, IngestError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = TranslatorRegistry::new();
        registry.register(MembershipTranslator);
        registry.register(MembershipTranslator);
        assert_eq!(registry.tables(), vec!["memberships"]);
    }
}
