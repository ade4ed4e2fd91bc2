//! Dead-letter producer for poison messages.
//!
//! Parked messages keep their key and payload; the failure and the
//! source coordinates travel as headers so an operator can replay them.

use async_trait::async_trait;
use cdc_kafka::{create_producer, FutureRecord, Header, KafkaConfig, OwnedHeaders};
use rdkafka::producer::FutureProducer;
use std::time::Duration;
use tracing::{info, warn};

use crate::consumer::SourceMessage;
use crate::errors::IngestError;
use crate::reader::PoisonSink;

/// How long a dead-letter record may wait in the producer queue.
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

pub const HEADER_ERROR: &str = "x-cdc-error";
pub const HEADER_SOURCE_TOPIC: &str = "x-cdc-source-topic";
pub const HEADER_SOURCE_PARTITION: &str = "x-cdc-source-partition";
pub const HEADER_SOURCE_OFFSET: &str = "x-cdc-source-offset";

/// Publishes poison messages to a dead-letter topic.
pub struct DeadLetterProducer {
    producer: FutureProducer,
    topic: String,
}

impl DeadLetterProducer {
    /// Create a producer writing to `topic`.
    pub fn new(config: &KafkaConfig, topic: impl Into<String>) -> Result<Self, IngestError> {
        let producer = create_producer(config)
            .map_err(|e| IngestError::DeadLetterError(e.to_string()))?;
        let topic = topic.into();

        info!(topic = %topic, broker = %config.broker, "Created dead-letter producer");

        Ok(Self { producer, topic })
    }
}

/// Diagnostic headers attached to a parked message.
fn dead_letter_headers(message: &SourceMessage, error: &IngestError) -> OwnedHeaders {
    let error = error.to_string();
    let partition = message.partition.to_string();
    let offset = message.offset.to_string();

    OwnedHeaders::new()
        .insert(Header {
            key: HEADER_ERROR,
            value: Some(error.as_str()),
        })
        .insert(Header {
            key: HEADER_SOURCE_TOPIC,
            value: Some(message.topic.as_str()),
        })
        .insert(Header {
            key: HEADER_SOURCE_PARTITION,
            value: Some(partition.as_str()),
        })
        .insert(Header {
            key: HEADER_SOURCE_OFFSET,
            value: Some(offset.as_str()),
        })
}

#[async_trait]
impl PoisonSink for DeadLetterProducer {
    async fn park(&self, message: &SourceMessage, error: &IngestError) -> Result<(), IngestError> {
        let mut record = FutureRecord::<[u8], [u8]>::to(&self.topic)
            .headers(dead_letter_headers(message, error));
        if let Some(key) = &message.key {
            record = record.key(key.as_slice());
        }
        if let Some(payload) = &message.payload {
            record = record.payload(payload.as_slice());
        }

        match self.producer.send(record, QUEUE_TIMEOUT).await {
            Ok(_) => {
                warn!(
                    dead_letter_topic = %self.topic,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Parked poison message"
                );
                Ok(())
            }
            Err((e, _)) => Err(IngestError::DeadLetterError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::Headers;

    #[test]
    fn test_dead_letter_headers() {
        let message = SourceMessage::new("cdc.public.jobs", 3, 17).with_payload(b"{}".to_vec());
        let error = IngestError::connection_lost("all brokers down");

        let headers = dead_letter_headers(&message, &error);
        assert_eq!(headers.count(), 4);

        let values: Vec<(String, String)> = headers
            .iter()
            .map(|h| {
                (
                    h.key.to_string(),
                    String::from_utf8_lossy(h.value.unwrap_or_default()).into_owned(),
                )
            })
            .collect();

        assert_eq!(values[0].0, HEADER_ERROR);
        assert!(values[0].1.contains("all brokers down"));
        assert_eq!(values[1], (HEADER_SOURCE_TOPIC.to_string(), "cdc.public.jobs".to_string()));
        assert_eq!(values[2], (HEADER_SOURCE_PARTITION.to_string(), "3".to_string()));
        assert_eq!(values[3], (HEADER_SOURCE_OFFSET.to_string(), "17".to_string()));
    }
}
