//! Event dispatcher.
//!
//! Routes a decoded change envelope to its table's translator and to the
//! matching gateway operation.

use std::sync::Arc;

use cdc_indexer_repository::{DeleteDocumentRequest, SyncGateway};
use cdc_indexer_shared::{ChangeEnvelope, OpCode, RowImage};
use tracing::{debug, instrument};

use crate::errors::IngestError;
use crate::translator::{EntityTranslator, TranslatorRegistry};

/// What the dispatcher did with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Upserted { document_id: String },
    Deleted { document_id: String },
    /// The operation does not touch the index.
    Ignored { operation: OpCode },
}

/// Applies change envelopes to the search index.
pub struct EventDispatcher {
    translators: Arc<TranslatorRegistry>,
    gateway: SyncGateway,
}

impl EventDispatcher {
    pub fn new(translators: Arc<TranslatorRegistry>, gateway: SyncGateway) -> Self {
        Self {
            translators,
            gateway,
        }
    }

    /// Apply one envelope.
    ///
    /// | Operation    | Action                      |
    /// |--------------|-----------------------------|
    /// | Create       | translate `after`, upsert   |
    /// | Update       | translate `after`, upsert   |
    /// | Delete       | id from `before`, delete    |
    /// | SnapshotRead | nothing                     |
    ///
    /// The document or id is fully derived before the gateway is called, so a
    /// malformed row never reaches the index.
    #[instrument(skip(self, envelope), fields(table = %envelope.table, operation = %envelope.operation))]
    pub async fn dispatch(&self, envelope: &ChangeEnvelope) -> Result<DispatchOutcome, IngestError> {
        match envelope.operation {
            OpCode::Create | OpCode::Update => {
                let translator = self.translator(&envelope.table)?;
                let after = required_image(envelope.after.as_ref(), envelope, "after")?;
                self.upsert(translator, after, envelope.source_timestamp)
                    .await
            }
            OpCode::Delete => {
                let translator = self.translator(&envelope.table)?;
                let before = required_image(envelope.before.as_ref(), envelope, "before")?;
                self.delete(translator, before, envelope.source_timestamp)
                    .await
            }
            OpCode::SnapshotRead => {
                debug!("Ignoring snapshot read");
                Ok(DispatchOutcome::Ignored {
                    operation: OpCode::SnapshotRead,
                })
            }
        }
    }

    fn translator(&self, table: &str) -> Result<&dyn EntityTranslator, IngestError> {
        self.translators
            .get(table)
            .ok_or_else(|| IngestError::UnknownTable(table.to_string()))
    }

    async fn upsert(
        &self,
        translator: &dyn EntityTranslator,
        row: &RowImage,
        source_timestamp: Option<i64>,
    ) -> Result<DispatchOutcome, IngestError> {
        let document = translator.translate(row, source_timestamp)?;

        match self.gateway.upsert(&document).await {
            Ok(()) => Ok(DispatchOutcome::Upserted {
                document_id: document.document_id,
            }),
            Err(e) => {
                let body = serde_json::to_string(&document).ok();
                Err(IngestError::sync_failure(&document.document_id, body, e))
            }
        }
    }

    async fn delete(
        &self,
        translator: &dyn EntityTranslator,
        row: &RowImage,
        source_timestamp: Option<i64>,
    ) -> Result<DispatchOutcome, IngestError> {
        let document_id = translator.document_id(row)?;
        let request = DeleteDocumentRequest::new(&document_id, source_timestamp);

        match self.gateway.delete(&request).await {
            Ok(()) => Ok(DispatchOutcome::Deleted { document_id }),
            Err(e) => Err(IngestError::sync_failure(document_id, None, e)),
        }
    }
}

/// Row images are validated at decode time; this guards envelopes built in code.
fn required_image<'a>(
    image: Option<&'a RowImage>,
    envelope: &ChangeEnvelope,
    name: &str,
) -> Result<&'a RowImage, IngestError> {
    image.ok_or_else(|| {
        IngestError::malformed(format!(
            "{} on table '{}' has no {} image",
            envelope.operation, envelope.table, name
        ))
    })
}
