//! Translator for the `jobs` table.

use cdc_indexer_shared::{IndexDocument, RowImage};

use crate::translator::{translate_columns, Column, ColumnKind, EntityTranslator, TranslateError};

pub const TABLE: &str = "jobs";

const COLUMNS: &[Column] = &[
    Column::new("title", ColumnKind::Text),
    Column::new("description", ColumnKind::Text),
    Column::new("organization_id", ColumnKind::Keyword),
    Column::new("location", ColumnKind::Keyword),
    Column::new("employment_type", ColumnKind::Keyword),
    Column::new("remote", ColumnKind::Boolean),
    Column::new("salary_min", ColumnKind::Number),
    Column::new("salary_max", ColumnKind::Number),
    Column::new("currency", ColumnKind::Keyword),
    Column::new("status", ColumnKind::Keyword),
    Column::new("published_at", ColumnKind::Timestamp),
    Column::new("updated_at", ColumnKind::Timestamp),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct JobTranslator;

impl EntityTranslator for JobTranslator {
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
