//! This module defines the core data structures used across the CDC indexer.
//! It re-exports the envelope model and the index document types.

pub mod envelope;
pub mod index_document;

pub use envelope::{ChangeEnvelope, EnvelopeError, OpCode, RowImage};
pub use index_document::{IndexDocument, SyncKey};
