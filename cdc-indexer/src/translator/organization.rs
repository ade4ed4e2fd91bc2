//! Translator for the `organizations` table.

use cdc_indexer_shared::{IndexDocument, RowImage};

use crate::translator::{translate_columns, Column, ColumnKind, EntityTranslator, TranslateError};

pub const TABLE: &str = "organizations";

const COLUMNS: &[Column] = &[
    Column::new("name", ColumnKind::Text),
    Column::new("slug", ColumnKind::Keyword),
    Column::new("description", ColumnKind::Text),
    Column::new("website", ColumnKind::Keyword),
    Column::new("logo_url", ColumnKind::Keyword).renamed("logo"),
    Column::new("industry", ColumnKind::Keyword),
    Column::new("location", ColumnKind::Keyword),
    Column::new("employee_count", ColumnKind::Number),
    Column::new("created_at", ColumnKind::Timestamp),
    Column::new("updated_at", ColumnKind::Timestamp),
];

/// Organization listing documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationTranslator;

impl EntityTranslator for OrganizationTranslator {
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
