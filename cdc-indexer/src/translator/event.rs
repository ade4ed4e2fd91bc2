//! Translator for the `events` table.

use cdc_indexer_shared::{IndexDocument, RowImage};

use crate::translator::{translate_columns, Column, ColumnKind, EntityTranslator, TranslateError};

pub const TABLE: &str = "events";

const COLUMNS: &[Column] = &[
    Column::new("title", ColumnKind::Text),
    Column::new("description", ColumnKind::Text),
    Column::new("organization_id", ColumnKind::Keyword),
    Column::new("venue", ColumnKind::Text),
    Column::new("city", ColumnKind::Keyword),
    Column::new("is_online", ColumnKind::Boolean),
    Column::new("capacity", ColumnKind::Number),
    Column::new("starts_at", ColumnKind::Timestamp),
    Column::new("ends_at", ColumnKind::Timestamp),
    Column::new("updated_at", ColumnKind::Timestamp),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct EventTranslator;

impl EntityTranslator for EventTranslator {
    fn table(&self) -> &str {
        TABLE
    }

    fn translate(
        &self,
        row: &RowImage,
        source_timestamp: Option<i64>,
    ) -> Result<IndexDocument, TranslateError> {
        translate_columns(self, COLUMNS, row, source_timestamp)
    }
}
