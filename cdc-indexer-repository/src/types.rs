//! Request types for search index operations.

/// Request to delete a document from the search index.
///
/// The document id is derived from the row's `before` image. The source
/// timestamp lets versioned backends ignore a delete that is older than the
/// indexed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteDocumentRequest {
    /// The document's id (`{table}:{primary_key}`).
    pub document_id: String,
    /// Source commit time in epoch milliseconds, if known.
    pub source_timestamp: Option<i64>,
}

impl DeleteDocumentRequest {
    pub fn new(document_id: impl Into<String>, source_timestamp: Option<i64>) -> Self {
        Self {
            document_id: document_id.into(),
            source_timestamp,
        }
    }
}
