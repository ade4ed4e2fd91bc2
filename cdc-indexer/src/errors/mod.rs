//! Error types for the CDC indexer pipeline.

use cdc_indexer_repository::SearchIndexError;
use cdc_indexer_shared::EnvelopeError;
use thiserror::Error;

/// Errors that can occur while consuming and applying change events.
///
/// Every variant except `BrokerConnectionLost` is scoped to one message: the
/// reader logs it, settles the message and moves on.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The payload cannot be decoded or violates the before/after invariant.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// No translator is registered for the envelope's table.
    #[error("No translator registered for table '{0}'")]
    UnknownTable(String),

    /// The index engine was unreachable or timed out.
    #[error("Transient sync failure for {document_id}: {source}")]
    TransientSyncFailure {
        document_id: String,
        #[source]
        source: SearchIndexError,
    },

    /// The index engine rejected the mutation.
    #[error("Permanent sync failure for {document_id}: {source}")]
    PermanentSyncFailure {
        document_id: String,
        /// JSON body of the rejected document, for upserts.
        document: Option<String>,
        #[source]
        source: SearchIndexError,
    },

    /// The broker connection is gone and could not be re-established.
    #[error("Broker connection lost: {0}")]
    BrokerConnectionLost(String),

    /// Kafka-related error that does not end the worker.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Parking a poison message failed.
    #[error("Dead letter error: {0}")]
    DeadLetterError(String),

    /// A worker task ended abnormally.
    #[error("Worker error: {0}")]
    WorkerError(String),
}

impl IngestError {
    /// Create a malformed envelope error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEnvelope(msg.into())
    }

    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a broker connection lost error.
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::BrokerConnectionLost(msg.into())
    }

    /// Classify a gateway error for the given document.
    pub fn sync_failure(
        document_id: impl Into<String>,
        document: Option<String>,
        source: SearchIndexError,
    ) -> Self {
        if source.is_transient() {
            Self::TransientSyncFailure {
                document_id: document_id.into(),
                source,
            }
        } else {
            Self::PermanentSyncFailure {
                document_id: document_id.into(),
                document,
                source,
            }
        }
    }

    /// Whether retrying the same message may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientSyncFailure { .. })
    }
}

impl From<EnvelopeError> for IngestError {
    fn from(err: EnvelopeError) -> Self {
        Self::MalformedEnvelope(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}
