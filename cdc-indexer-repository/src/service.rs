//! Index sync gateway.
//!
//! This module provides the service the indexer writes through. It validates
//! document ids and bounds every backend call with a timeout, then delegates
//! to a `SearchIndexProvider`.

use std::future::Future;
use std::sync::Arc;

use cdc_indexer_shared::IndexDocument;
use tracing::{debug, instrument};

use crate::config::SyncGatewayConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::DeleteDocumentRequest;
use crate::utils::validate_document_id;

/// The gateway for mutating the search index.
///
/// Each indexer worker owns one gateway and the provider inside it; providers
/// are not shared across workers.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use cdc_indexer_repository::SyncGateway;
/// use cdc_indexer_repository::opensearch::{IndexConfig, OpenSearchProvider};
/// use cdc_indexer_shared::{IndexDocument, SyncKey};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = IndexConfig::new("documents", 0);
/// let provider = OpenSearchProvider::new("http://localhost:9200", config).await?;
/// let gateway = SyncGateway::new(Arc::new(provider));
///
/// let doc = IndexDocument::new(&SyncKey::new("organizations", "1"), Some(1))
///     .with_field("name", "Acme");
/// gateway.upsert(&doc).await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncGateway {
    provider: Arc<dyn SearchIndexProvider>,
    config: SyncGatewayConfig,
}

impl SyncGateway {
    /// Create a new gateway with default configuration.
    pub fn new(provider: Arc<dyn SearchIndexProvider>) -> Self {
        Self {
            provider,
            config: SyncGatewayConfig::default(),
        }
    }

    /// Create a new gateway with custom configuration.
    pub fn with_config(provider: Arc<dyn SearchIndexProvider>, config: SyncGatewayConfig) -> Self {
        Self { provider, config }
    }

    /// Ensure the backing index exists.
    pub async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        self.bounded("ensure_index_exists", self.provider.ensure_index_exists())
            .await
    }

    /// Insert or replace a document.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was written
    /// * `Err(SearchIndexError::ValidationError)` - If the document id is unusable
    /// * `Err(SearchIndexError::Timeout)` - If the backend did not answer in time
    /// * `Err(SearchIndexError)` - If the backend rejected the write
    #[instrument(skip(self, document), fields(document_id = %document.document_id))]
    pub async fn upsert(&self, document: &IndexDocument) -> Result<(), SearchIndexError> {
        validate_document_id(&document.document_id)?;

        self.bounded("upsert", self.provider.upsert_document(document))
            .await?;

        debug!("Document upserted");
        Ok(())
    }

    /// Delete a document. Deleting a missing document succeeds.
    #[instrument(skip(self, request), fields(document_id = %request.document_id))]
    pub async fn delete(&self, request: &DeleteDocumentRequest) -> Result<(), SearchIndexError> {
        validate_document_id(&request.document_id)?;

        self.bounded("delete", self.provider.delete_document(request))
            .await?;

        debug!("Document deleted");
        Ok(())
    }

    async fn bounded<F>(&self, operation: &str, call: F) -> Result<(), SearchIndexError>
    where
        F: Future<Output = Result<(), SearchIndexError>>,
    {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SearchIndexError::timeout(format!(
                "{} did not complete within {:?}",
                operation, self.config.request_timeout
            ))),
        }
    }
}
