//! Message source trait.

use async_trait::async_trait;

use crate::consumer::SourceMessage;
use crate::errors::IngestError;

/// A partition-ordered stream of broker messages with manual commits.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message.
    ///
    /// `Ok(None)` means the source is exhausted and the reader should stop.
    /// `Err(IngestError::BrokerConnectionLost)` asks the reader to reconnect.
    async fn next_message(&mut self) -> Result<Option<SourceMessage>, IngestError>;

    /// Commit the message, so the group resumes after it.
    async fn commit(&mut self, message: &SourceMessage) -> Result<(), IngestError>;

    /// Re-establish the broker connection and resubscribe.
    async fn reconnect(&mut self) -> Result<(), IngestError>;
}
