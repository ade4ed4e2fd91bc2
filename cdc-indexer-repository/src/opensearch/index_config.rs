//! OpenSearch index configuration and mappings.
//!
//! All tracked tables share one index; documents carry a `table` field as the
//! discriminator and ids are prefixed with the table name.

use serde_json::{json, Value};

/// Configuration for the search index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The alias name for the search index (used for all operations).
    pub alias: String,
    /// The version number for the index (e.g., 0 for "documents_v0").
    pub version: u32,
    /// Send the source timestamp as an `external_gte` document version, so
    /// the engine ignores writes older than the indexed document.
    pub source_versioning: bool,
}

impl IndexConfig {
    /// Create a new index configuration with source versioning enabled.
    ///
    /// # Arguments
    ///
    /// * `alias` - The index alias name
    /// * `version` - The version number
    pub fn new(alias: impl Into<String>, version: u32) -> Self {
        Self {
            alias: alias.into(),
            version,
            source_versioning: true,
        }
    }

    /// Enable or disable source versioning.
    pub fn with_source_versioning(mut self, enabled: bool) -> Self {
        self.source_versioning = enabled;
        self
    }

    /// The concrete index name behind the alias.
    pub fn index_name(&self) -> String {
        get_versioned_index_name(&self.alias, Some(self.version))
    }
}

/// Get the versioned index name.
///
/// # Arguments
///
/// * `alias` - The alias the index is published under
/// * `version` - The version number (defaults to 0 if None)
///
/// # Returns
///
/// The versioned index name (e.g., "documents_v0")
pub fn get_versioned_index_name(alias: &str, version: Option<u32>) -> String {
    let v = version.unwrap_or(0);
    format!("{}_v{}", alias, v)
}

/// Get the index settings and mappings for the shared document index.
///
/// The configuration includes:
/// - **Keyword fields**: `document_id`, `table` and foreign keys for filtering
/// - **search_as_you_type**: `name` and `title` for autocomplete listings
/// - **Date fields**: source timestamp and translated timestamp columns
///
/// Columns not listed here are mapped dynamically.
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "properties": {
                "document_id": { "type": "keyword" },
                "table": { "type": "keyword" },
                "source_timestamp": { "type": "date", "format": "epoch_millis" },
                "name": {
                    "type": "search_as_you_type",
                    "fields": { "raw": { "type": "keyword" } }
                },
                "title": {
                    "type": "search_as_you_type",
                    "fields": { "raw": { "type": "keyword" } }
                },
                "description": { "type": "text" },
                "slug": { "type": "keyword" },
                "organization_id": { "type": "keyword" },
                "location": { "type": "keyword" },
                "city": { "type": "keyword" },
                "industry": { "type": "keyword" },
                "employment_type": { "type": "keyword" },
                "status": { "type": "keyword" },
                "currency": { "type": "keyword" },
                "website": { "type": "keyword", "index": false },
                "logo": { "type": "keyword", "index": false },
                "remote": { "type": "boolean" },
                "is_online": { "type": "boolean" },
                "salary_min": { "type": "double" },
                "salary_max": { "type": "double" },
                "employee_count": { "type": "long" },
                "capacity": { "type": "long" },
                "starts_at": { "type": "date" },
                "ends_at": { "type": "date" },
                "published_at": { "type": "date" },
                "created_at": { "type": "date" },
                "updated_at": { "type": "date" }
            }
        }
    })
}
