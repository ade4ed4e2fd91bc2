//! Utility functions for the CDC indexer repository.

use crate::errors::SearchIndexError;

/// Maximum length of a document id accepted by the index engine, in bytes.
pub const MAX_DOCUMENT_ID_BYTES: usize = 512;

/// Validate a document id before it is sent to the backend.
///
/// # Arguments
///
/// * `document_id` - The document id to check
///
/// # Returns
///
/// * `Ok(())` - If the id is usable
/// * `Err(SearchIndexError::ValidationError)` - If the id is empty or too long
///
/// # Example
///
/// ```
/// use cdc_indexer_repository::validate_document_id;
///
/// assert!(validate_document_id("organizations:1").is_ok());
/// assert!(validate_document_id("").is_err());
/// ```
pub fn validate_document_id(document_id: &str) -> Result<(), SearchIndexError> {
    if document_id.is_empty() {
        return Err(SearchIndexError::validation("document_id is required"));
    }

    if document_id.len() > MAX_DOCUMENT_ID_BYTES {
        return Err(SearchIndexError::validation(format!(
            "document_id is {} bytes, maximum is {}",
            document_id.len(),
            MAX_DOCUMENT_ID_BYTES
        )));
    }

    Ok(())
}

/// External document version for a source timestamp.
///
/// Versions must be non-negative. Without a timestamp there is no version and
/// the write is applied unconditionally.
pub fn external_version(source_timestamp: Option<i64>) -> Option<i64> {
    source_timestamp.map(|ts| ts.max(0))
}
