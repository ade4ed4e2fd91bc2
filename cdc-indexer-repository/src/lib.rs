//! # CDC Indexer Repository
//!
//! This crate provides the index sync gateway: the trait the indexer writes
//! through, a service that bounds every call with a timeout, the error type
//! with its transient/permanent classification, and a concrete OpenSearch
//! implementation.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod service;
pub mod types;
pub mod utils;

pub use config::SyncGatewayConfig;
pub use errors::SearchIndexError;
pub use interfaces::SearchIndexProvider;
pub use opensearch::OpenSearchProvider;
pub use service::SyncGateway;
pub use types::DeleteDocumentRequest;
pub use utils::{external_version, validate_document_id};
