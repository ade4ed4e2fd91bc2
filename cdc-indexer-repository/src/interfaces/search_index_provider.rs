//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, in-memory fakes, etc.).

use async_trait::async_trait;
use cdc_indexer_shared::IndexDocument;

use crate::errors::SearchIndexError;
use crate::types::DeleteDocumentRequest;

/// Abstracts the underlying search index implementation.
///
/// Implementations are wrapped by [`SyncGateway`](crate::SyncGateway), which
/// validates ids and bounds every call with a timeout. Implementations are the
/// only code that performs network I/O against the index.
///
/// Both document operations must be idempotent: upserting the same document
/// twice leaves the index as a single upsert would, and deleting a document
/// that does not exist succeeds.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Ensure the search index and any required aliases exist, creating them if necessary.
    ///
    /// Called once during startup before any document operation.
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError>;

    /// Insert the document, or replace it entirely if one with the same id exists.
    ///
    /// # Arguments
    ///
    /// * `document` - The translated document, keyed by `document.document_id`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was written, or was older than the indexed one
    /// * `Err(SearchIndexError)` - If the operation fails
    async fn upsert_document(&self, document: &IndexDocument) -> Result<(), SearchIndexError>;

    /// Delete a document from the search index.
    ///
    /// If the document doesn't exist, the operation is considered successful.
    ///
    /// # Arguments
    ///
    /// * `request` - The delete request identifying the document
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was deleted (or didn't exist)
    /// * `Err(SearchIndexError)` - If the deletion fails
    async fn delete_document(&self, request: &DeleteDocumentRequest)
        -> Result<(), SearchIndexError>;
}
