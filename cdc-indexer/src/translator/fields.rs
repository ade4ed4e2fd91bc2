//! Column declarations and value conversion for the built-in translators.

use chrono::{DateTime, SecondsFormat, Utc};
use cdc_indexer_shared::{IndexDocument, RowImage};
use serde_json::{Number, Value};

use crate::translator::{EntityTranslator, TranslateError};

/// How a source column is converted into a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free text. Non-string values are ignored.
    Text,
    /// JSON numbers, or numeric strings from decimal columns.
    Number,
    /// JSON booleans, or `0`/`1`.
    Boolean,
    /// Epoch microseconds or RFC 3339, normalised to RFC 3339 UTC.
    Timestamp,
    /// Any scalar, copied as a string.
    Keyword,
}

/// One indexed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name in the row image.
    pub name: &'static str,
    /// Field name in the document.
    pub field: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            field: name,
            kind,
        }
    }

    /// Index the column under a different field name.
    pub const fn renamed(mut self, field: &'static str) -> Self {
        self.field = field;
        self
    }

    /// Convert the column's value.
    ///
    /// `Ok(None)` means the field is left out of the document.
    pub fn convert(&self, value: &Value) -> Result<Option<Value>, String> {
        match self.kind {
            ColumnKind::Text => Ok(value.as_str().map(|s| Value::String(s.to_string()))),
            ColumnKind::Number => Ok(convert_number(value)),
            ColumnKind::Boolean => Ok(convert_boolean(value)),
            ColumnKind::Timestamp => convert_timestamp(value).map(Some),
            ColumnKind::Keyword => Ok(convert_keyword(value)),
        }
    }
}

fn convert_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}

fn convert_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        _ => None,
    }
}

fn convert_timestamp(value: &Value) -> Result<Value, String> {
    let timestamp: DateTime<Utc> = match value {
        Value::Number(n) => {
            let micros = n
                .as_i64()
                .ok_or_else(|| format!("expected integer epoch microseconds, got {}", n))?;
            DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| format!("epoch microseconds {} out of range", micros))?
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))?
            .with_timezone(&Utc),
        other => return Err(format!("unsupported timestamp value {}", other)),
    };

    Ok(Value::String(
        timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    ))
}

fn convert_keyword(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

/// Build a document from a row using a column list.
///
/// Null and missing columns are omitted. An unconvertible timestamp fails the
/// whole row.
pub fn translate_columns<T: EntityTranslator + ?Sized>(
    translator: &T,
    columns: &[Column],
    row: &RowImage,
    source_timestamp: Option<i64>,
) -> Result<IndexDocument, TranslateError> {
    let key = translator.sync_key(row)?;
    let mut document = IndexDocument::new(&key, source_timestamp);

    for column in columns {
        let Some(value) = row.get(column.name) else {
            continue;
        };

        let converted = column
            .convert(value)
            .map_err(|reason| TranslateError::InvalidColumn {
                table: translator.table().to_string(),
                column: column.name.to_string(),
                reason,
            })?;

        if let Some(converted) = converted {
            document.insert(column.field, converted);
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_from_micros_and_rfc3339() {
        let column = Column::new("updated_at", ColumnKind::Timestamp);

        let from_micros = column.convert(&json!(1_700_000_000_123_000_i64)).unwrap();
        assert_eq!(from_micros, Some(json!("2023-11-14T22:13:20.123Z")));

        let from_zoned = column.convert(&json!("2024-03-01T10:00:00+02:00")).unwrap();
        assert_eq!(from_zoned, Some(json!("2024-03-01T08:00:00Z")));

        assert!(column.convert(&json!("yesterday")).is_err());
        assert!(column.convert(&json!(true)).is_err());
    }

    #[test]
    fn test_number_accepts_decimal_strings() {
        let column = Column::new("salary_min", ColumnKind::Number);
        assert_eq!(column.convert(&json!(90000)).unwrap(), Some(json!(90000)));
        assert_eq!(column.convert(&json!("120")).unwrap(), Some(json!(120)));
        assert_eq!(column.convert(&json!("95000.50")).unwrap(), Some(json!(95000.5)));
        assert_eq!(column.convert(&json!("n/a")).unwrap(), None);
    }

    #[test]
    fn test_boolean_and_keyword() {
        let remote = Column::new("remote", ColumnKind::Boolean);
        assert_eq!(remote.convert(&json!(1)).unwrap(), Some(json!(true)));
        assert_eq!(remote.convert(&json!(false)).unwrap(), Some(json!(false)));
        assert_eq!(remote.convert(&json!(2)).unwrap(), None);

        let org = Column::new("organization_id", ColumnKind::Keyword);
        assert_eq!(org.convert(&json!(42)).unwrap(), Some(json!("42")));
        assert_eq!(org.convert(&json!({"nested": 1})).unwrap(), None);
    }

    #[test]
    fn test_text_ignores_non_strings() {
        let column = Column::new("name", ColumnKind::Text);
        assert_eq!(column.convert(&json!("Acme")).unwrap(), Some(json!("Acme")));
        assert_eq!(column.convert(&json!(5)).unwrap(), None);
    }

    #[test]
    fn test_renamed_column() {
        let column = Column::new("logo_url", ColumnKind::Keyword).renamed("logo");
        assert_eq!(column.name, "logo_url");
        assert_eq!(column.field, "logo");
    }
}
