//! Poison message handling.
//!
//! A message whose transient failures outlive the retry budget is either
//! skipped or parked on a dead-letter topic. Either way its offset is then
//! committed so the partition keeps moving.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::consumer::SourceMessage;
use crate::errors::IngestError;

/// Configured poison message policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoisonPolicy {
    /// Log and move on.
    #[default]
    Skip,
    /// Publish to the dead-letter topic, then move on.
    Park,
}

impl FromStr for PoisonPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "park" | "dead-letter" | "dead_letter" => Ok(Self::Park),
            other => Err(format!("unknown poison policy '{}'", other)),
        }
    }
}

impl fmt::Display for PoisonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Park => write!(f, "park"),
        }
    }
}

/// Destination for parked messages.
#[async_trait]
pub trait PoisonSink: Send + Sync {
    async fn park(&self, message: &SourceMessage, error: &IngestError) -> Result<(), IngestError>;
}

/// What happened to a poison message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoisonAction {
    Skipped,
    Parked,
}

/// The policy a reader applies, with its sink when parking.
#[derive(Clone, Default)]
pub enum PoisonHandler {
    #[default]
    Skip,
    Park(Arc<dyn PoisonSink>),
}

impl PoisonHandler {
    pub fn policy(&self) -> PoisonPolicy {
        match self {
            Self::Skip => PoisonPolicy::Skip,
            Self::Park(_) => PoisonPolicy::Park,
        }
    }

    /// Set the message aside. A sink failure falls back to skipping.
    pub async fn handle(&self, message: &SourceMessage, cause: &IngestError) -> PoisonAction {
        match self {
            Self::Skip => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %cause,
                    "Skipping poison message"
                );
                PoisonAction::Skipped
            }
            Self::Park(sink) => match sink.park(message, cause).await {
                Ok(()) => PoisonAction::Parked,
                Err(e) => {
                    error!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %cause,
                        park_error = %e,
                        "Failed to park poison message, skipping it"
                    );
                    PoisonAction::Skipped
                }
            },
        }
    }
}

impl fmt::Debug for PoisonHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoisonHandler({})", self.policy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        parked: Mutex<Vec<i64>>,
        fail: bool,
    }

    #[async_trait]
    impl PoisonSink for MemorySink {
        async fn park(
            &self,
            message: &SourceMessage,
            _error: &IngestError,
        ) -> Result<(), IngestError> {
            if self.fail {
                return Err(IngestError::DeadLetterError("queue full".to_string()));
            }
            self.parked.lock().unwrap().push(message.offset);
            Ok(())
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("skip".parse::<PoisonPolicy>(), Ok(PoisonPolicy::Skip));
        assert_eq!(" PARK ".parse::<PoisonPolicy>(), Ok(PoisonPolicy::Park));
        assert!("drop".parse::<PoisonPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_park_uses_sink() {
        let sink = Arc::new(MemorySink::default());
        let handler = PoisonHandler::Park(sink.clone());
        let message = SourceMessage::new("cdc.public.jobs", 0, 9);

        let action = handler
            .handle(&message, &IngestError::kafka("timeout"))
            .await;

        assert_eq!(action, PoisonAction::Parked);
        assert_eq!(*sink.parked.lock().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_failed_park_falls_back_to_skip() {
        let sink = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let handler = PoisonHandler::Park(sink);
        let message = SourceMessage::new("cdc.public.jobs", 0, 9);

        let action = handler
            .handle(&message, &IngestError::kafka("timeout"))
            .await;
        assert_eq!(action, PoisonAction::Skipped);
    }
}
