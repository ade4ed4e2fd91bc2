//! Search index error types.
//!
//! This module defines the unified error type for all search index operations
//! and its classification into transient and permanent failures.

use thiserror::Error;

/// Unified errors from search index operations.
///
/// Used by the `SearchIndexProvider` trait and `SyncGateway`. Callers decide
/// whether to retry with [`SearchIndexError::is_transient`].
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., empty or oversized document id).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to reach the search index backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend did not answer within the configured timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The backend rejected an upsert.
    #[error("Upsert failed with status {status}: {message}")]
    UpsertError { status: u16, message: String },

    /// The backend rejected a delete.
    #[error("Delete failed with status {status}: {message}")]
    DeleteError { status: u16, message: String },

    /// Failed to create the search index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an upsert error from a rejected response.
    pub fn upsert(status: u16, msg: impl Into<String>) -> Self {
        Self::UpsertError {
            status,
            message: msg.into(),
        }
    }

    /// Create a delete error from a rejected response.
    pub fn delete(status: u16, msg: impl Into<String>) -> Self {
        Self::DeleteError {
            status,
            message: msg.into(),
        }
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, timeouts, 5xx and 429 responses are transient.
    /// Everything else means the backend rejected the request itself.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Timeout(_) => true,
            Self::UpsertError { status, .. } | Self::DeleteError { status, .. } => {
                is_retryable_status(*status)
            }
            Self::ValidationError(_) | Self::IndexCreationError(_) => false,
        }
    }
}

/// Whether an HTTP status from the backend is worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
