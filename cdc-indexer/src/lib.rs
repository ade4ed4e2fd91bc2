//! # CDC Indexer
//!
//! Keeps a search index eventually consistent with a relational database by
//! consuming Debezium change events from Kafka and applying them to
//! OpenSearch.
//!
//! ## Architecture
//!
//! Each worker runs one sequential pipeline:
//!
//! 1. **Reader**: Pulls a message from its Kafka consumer
//! 2. **Envelope**: Decodes the message into a `ChangeEnvelope`
//! 3. **Dispatcher**: Picks the translator and the index operation
//! 4. **Translator**: Maps the row image to an `IndexDocument`
//! 5. **Gateway**: Applies the upsert or delete to the index
//!
//! The offset is committed only after the last step, so a crash replays the
//! message instead of losing it. The **Supervisor** runs the workers and owns
//! the shutdown lifecycle.
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency initialization
//! - [`consumer`]: Kafka message source and dead-letter producer
//! - [`translator`]: Per-table row to document translators
//! - [`dispatcher`]: Operation code dispatch
//! - [`reader`]: The per-worker read/dispatch/commit loop
//! - [`supervisor`]: Worker lifecycle and shutdown
//! - [`errors`]: Error types for the indexer

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod errors;
pub mod reader;
pub mod supervisor;
pub mod translator;

pub use config::{Dependencies, Settings};
pub use errors::IngestError;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
