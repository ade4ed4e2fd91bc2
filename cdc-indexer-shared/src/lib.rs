//! # CDC Indexer Shared
//!
//! This crate defines the data contract shared across the CDC indexer ecosystem:
//! the change envelope decoded from the broker and the document written to the
//! search index.

pub mod types;

pub use types::envelope::{ChangeEnvelope, EnvelopeError, OpCode, RowImage};
pub use types::index_document::{IndexDocument, SyncKey};
