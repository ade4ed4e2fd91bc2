//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use cdc_indexer_shared::IndexDocument;
use opensearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsAliasParts, IndicesPutAliasParts},
    params::VersionType,
    DeleteParts, IndexParts, OpenSearch,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::types::DeleteDocumentRequest;
use crate::utils;

/// How the backend answered a document write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    /// The write was applied.
    Applied,
    /// A newer version is already indexed; the write was ignored.
    Stale,
    /// The document did not exist.
    NotFound,
    /// The backend refused the write.
    Rejected,
}

impl WriteOutcome {
    fn from_status(status: u16, source_versioning: bool) -> Self {
        match status {
            200..=299 => Self::Applied,
            404 => Self::NotFound,
            409 if source_versioning => Self::Stale,
            _ => Self::Rejected,
        }
    }
}

/// OpenSearch provider implementation.
///
/// Writes every tracked table into one index alias. Upserts use the index API
/// (full document replace), deletes use the delete API.
///
/// # Example
///
/// ```ignore
/// use cdc_indexer_repository::opensearch::IndexConfig;
/// use cdc_indexer_shared::{IndexDocument, SyncKey};
///
/// let config = IndexConfig::new("documents", 0);
/// let provider = OpenSearchProvider::new("http://localhost:9200", config).await?;
/// provider.ensure_index_exists().await?;
///
/// let doc = IndexDocument::new(&SyncKey::new("organizations", "1"), Some(1_718_000_000_000))
///     .with_field("name", "Acme");
/// provider.upsert_document(&doc).await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index configuration containing alias and version
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            alias = %index_config.alias,
            version = index_config.version,
            source_versioning = index_config.source_versioning,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// The external version to send with a write, if any.
    ///
    /// Writes without a source timestamp are unversioned, so they always apply
    /// instead of being compared against a version of 0.
    fn write_version(&self, source_timestamp: Option<i64>) -> Option<i64> {
        if self.index_config.source_versioning {
            utils::external_version(source_timestamp)
        } else {
            None
        }
    }

    fn transport_error(err: opensearch::Error) -> SearchIndexError {
        SearchIndexError::connection(err.to_string())
    }

    /// Point the alias at an index that already exists.
    async fn put_alias(&self, index_name: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .put_alias(IndicesPutAliasParts::IndexName(
                &[index_name],
                &self.index_config.alias,
            ))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchIndexError::index_creation(format!(
                "Failed to add alias {} to {}: {} {}",
                self.index_config.alias, index_name, status, error_body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    /// Create the versioned index with its alias unless the alias already exists.
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        let alias = self.index_config.alias.as_str();

        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(Self::transport_error)?;

        match response.status_code().as_u16() {
            200 => {
                debug!(alias = %alias, "Index alias already exists");
                return Ok(());
            }
            404 => {}
            status => {
                return Err(SearchIndexError::index_creation(format!(
                    "Alias check for {} returned status {}",
                    alias, status
                )));
            }
        }

        let index_name = self.index_config.index_name();
        let mut body = get_index_settings();
        let mut aliases = Map::new();
        aliases.insert(alias.to_string(), json!({}));
        body["aliases"] = Value::Object(aliases);

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index_name))
            .body(body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %index_name, alias = %alias, "Created search index");
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        if error_body.contains("resource_already_exists_exception") {
            warn!(
                index = %index_name,
                alias = %alias,
                "Index exists without alias, adding alias"
            );
            return self.put_alias(&index_name).await;
        }

        error!(status = %status, body = %error_body, "Index creation failed");
        Err(SearchIndexError::index_creation(format!(
            "Creating {} failed with status {}: {}",
            index_name, status, error_body
        )))
    }

    /// Index the document under its id, replacing any existing version.
    ///
    /// With source versioning, a 409 means a newer source event has already
    /// been indexed and the write is treated as a successful no-op.
    async fn upsert_document(&self, document: &IndexDocument) -> Result<(), SearchIndexError> {
        let version = self.write_version(document.source_timestamp);

        let mut request = self
            .client
            .index(IndexParts::IndexId(
                &self.index_config.alias,
                &document.document_id,
            ))
            .body(document);
        if let Some(version) = version {
            request = request
                .version(version)
                .version_type(VersionType::ExternalGte);
        } else if document.source_timestamp.is_none() {
            debug!(
                document_id = %document.document_id,
                "Upsert without source timestamp, writing unversioned"
            );
        }

        let response = request.send().await.map_err(Self::transport_error)?;
        let status = response.status_code();

        match WriteOutcome::from_status(status.as_u16(), version.is_some()) {
            WriteOutcome::Applied => {
                debug!(document_id = %document.document_id, "Document indexed");
                Ok(())
            }
            WriteOutcome::Stale => {
                debug!(
                    document_id = %document.document_id,
                    source_timestamp = ?document.source_timestamp,
                    "Ignored upsert older than indexed document"
                );
                Ok(())
            }
            WriteOutcome::NotFound | WriteOutcome::Rejected => {
                let error_body = response.text().await.unwrap_or_default();
                error!(status = %status, body = %error_body, "Index request failed");
                Err(SearchIndexError::upsert(status.as_u16(), error_body))
            }
        }
    }

    /// Delete the document by id. 404 is success.
    async fn delete_document(
        &self,
        request: &DeleteDocumentRequest,
    ) -> Result<(), SearchIndexError> {
        let version = self.write_version(request.source_timestamp);

        let mut delete = self.client.delete(DeleteParts::IndexId(
            &self.index_config.alias,
            &request.document_id,
        ));
        if let Some(version) = version {
            delete = delete
                .version(version)
                .version_type(VersionType::ExternalGte);
        }

        let response = delete.send().await.map_err(Self::transport_error)?;
        let status = response.status_code();

        match WriteOutcome::from_status(status.as_u16(), version.is_some()) {
            WriteOutcome::Applied | WriteOutcome::NotFound => {
                debug!(document_id = %request.document_id, "Document deleted");
                Ok(())
            }
            WriteOutcome::Stale => {
                debug!(
                    document_id = %request.document_id,
                    source_timestamp = ?request.source_timestamp,
                    "Ignored delete older than indexed document"
                );
                Ok(())
            }
            WriteOutcome::Rejected => {
                let error_body = response.text().await.unwrap_or_default();
                error!(status = %status, body = %error_body, "Delete request failed");
                Err(SearchIndexError::delete(status.as_u16(), error_body))
            }
        }
    }
}
