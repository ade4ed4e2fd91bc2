//! Kafka consumer implementation for the CDC indexer.
//!
//! Pulls Debezium change events one at a time and commits each offset
//! explicitly once the reader has applied the message.

use async_trait::async_trait;
use cdc_kafka::{create_consumer, KafkaConfig};
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
    message::Message as KafkaMessage,
    Offset, TopicPartitionList,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::consumer::{MessageSource, SourceMessage};
use crate::errors::IngestError;

/// Default timeout for the metadata probe after reconnecting.
const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka consumer for change events.
///
/// Each worker owns one consumer; all workers share a consumer group so the
/// broker assigns them disjoint partitions.
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    config: KafkaConfig,
    topics: Vec<String>,
    metadata_timeout: Duration,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer.
    ///
    /// # Arguments
    ///
    /// * `config` - Broker, group and security settings
    /// * `topics` - CDC topics to subscribe to
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(IngestError)` - If consumer creation fails
    pub fn new(config: KafkaConfig, topics: Vec<String>) -> Result<Self, IngestError> {
        let consumer = create_consumer(&config).map_err(|e| IngestError::kafka(e.to_string()))?;

        info!(
            broker = %config.broker,
            group_id = %config.group_id,
            client_id = %config.client_id,
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            config,
            topics,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
        })
    }

    /// Subscribe to configured topics.
    pub fn subscribe(&self) -> Result<(), IngestError> {
        Self::subscribe_consumer(&self.consumer, &self.topics)?;
        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    fn subscribe_consumer(consumer: &StreamConsumer, topics: &[String]) -> Result<(), IngestError> {
        let topics: Vec<&str> = topics.iter().map(|s| s.as_str()).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| IngestError::kafka(e.to_string()))
    }

    /// Ask the brokers for cluster metadata to prove the connection works.
    async fn probe_metadata(
        consumer: Arc<StreamConsumer>,
        timeout: Duration,
    ) -> Result<(), IngestError> {
        let result =
            tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, timeout).map(|_| ()))
                .await
                .map_err(|e| IngestError::WorkerError(e.to_string()))?;

        result.map_err(|e| IngestError::connection_lost(format!("Metadata probe failed: {}", e)))
    }
}

/// Map a consumer error to the reader's error taxonomy.
///
/// Fatal client errors and "all brokers down" mean the connection is gone;
/// everything else concerns a single fetch.
pub fn classify_kafka_error(err: &KafkaError) -> IngestError {
    if let KafkaError::MessageConsumptionFatal(_) = err {
        return IngestError::connection_lost(err.to_string());
    }

    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::AllBrokersDown) | Some(RDKafkaErrorCode::Fatal) => {
            IngestError::connection_lost(err.to_string())
        }
        _ => IngestError::kafka(err.to_string()),
    }
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    async fn next_message(&mut self) -> Result<Option<SourceMessage>, IngestError> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| classify_kafka_error(&e))?;

        debug!(
            topic = %msg.topic(),
            partition = msg.partition(),
            offset = msg.offset(),
            "Received message from Kafka"
        );

        Ok(Some(SourceMessage {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().map(<[u8]>::to_vec),
        }))
    }

    async fn commit(&mut self, message: &SourceMessage) -> Result<(), IngestError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| IngestError::kafka(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| IngestError::kafka(e.to_string()))
    }

    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    async fn reconnect(&mut self) -> Result<(), IngestError> {
        let consumer = create_consumer(&self.config)
            .map(Arc::new)
            .map_err(|e| IngestError::connection_lost(e.to_string()))?;

        Self::probe_metadata(consumer.clone(), self.metadata_timeout).await?;
        Self::subscribe_consumer(&consumer, &self.topics)?;

        let previous = std::mem::replace(&mut self.consumer, consumer);
        // Closing a consumer blocks until it leaves the group.
        if let Err(e) = tokio::task::spawn_blocking(move || drop(previous)).await {
            warn!(error = %e, "Failed to close previous consumer");
        }

        info!(topics = ?self.topics, "Reconnected to Kafka");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_brokers_down_is_connection_lost() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::AllBrokersDown);
        assert!(matches!(
            classify_kafka_error(&err),
            IngestError::BrokerConnectionLost(_)
        ));
    }

    #[test]
    fn test_fatal_consumption_is_connection_lost() {
        let err = KafkaError::MessageConsumptionFatal(RDKafkaErrorCode::Fatal);
        assert!(matches!(
            classify_kafka_error(&err),
            IngestError::BrokerConnectionLost(_)
        ));
    }

    #[test]
    fn test_partition_error_is_not_fatal() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownTopicOrPartition);
        assert!(matches!(
            classify_kafka_error(&err),
            IngestError::KafkaError(_)
        ));
    }
}
