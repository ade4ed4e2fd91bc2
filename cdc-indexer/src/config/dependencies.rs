//! Dependency initialization and wiring for the CDC indexer.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{ConnectionMode, Settings};
use crate::consumer::{DeadLetterProducer, KafkaConsumer};
use crate::dispatcher::EventDispatcher;
use crate::reader::{BrokerReader, PoisonHandler, PoisonPolicy};
use crate::supervisor::Supervisor;
use crate::translator::TranslatorRegistry;
use crate::IndexingError;
use cdc_indexer_repository::opensearch::IndexConfig;
use cdc_indexer_repository::{OpenSearchProvider, SyncGateway};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured supervisor, with one reader per worker, ready to run.
    pub supervisor: Supervisor,
}

impl Dependencies {
    /// Build every worker from `settings`.
    ///
    /// Each worker gets its own Kafka consumer and its own OpenSearch client.
    /// The index and alias are created once, before any reader starts.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (OpenSearch only in fail-fast mode)
    pub async fn new(settings: &Settings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            kafka_broker = %settings.kafka_broker,
            kafka_group_id = %settings.kafka_group_id,
            topics = ?settings.kafka_topics,
            workers = settings.reader_workers,
            poison_policy = %settings.poison_policy,
            connection_mode = ?settings.connection_mode,
            "Initializing dependencies"
        );

        let translators = Arc::new(TranslatorRegistry::with_default_translators());
        let mut supervisor = Supervisor::new(settings.supervisor_config());

        for worker_id in 0..settings.reader_workers {
            let provider = Self::connect_to_opensearch(
                &settings.opensearch_url,
                settings.index_config(),
                settings.connection_mode,
                settings.retry_interval,
            )
            .await?;
            let gateway = SyncGateway::with_config(Arc::new(provider), settings.gateway_config());

            if worker_id == 0 {
                Self::ensure_index(&gateway, settings.connection_mode, settings.retry_interval)
                    .await?;
                info!("OpenSearch connection established");
            }

            let kafka_config = settings.kafka_config(worker_id);
            let consumer = KafkaConsumer::new(kafka_config.clone(), settings.kafka_topics.clone())
                .map_err(|e| {
                    IndexingError::config(format!("Failed to create Kafka consumer: {}", e))
                })?;
            consumer.subscribe().map_err(|e| {
                IndexingError::config(format!("Failed to subscribe to Kafka topics: {}", e))
            })?;

            let poison = match settings.poison_policy {
                PoisonPolicy::Skip => PoisonHandler::Skip,
                PoisonPolicy::Park => {
                    let producer = DeadLetterProducer::new(&kafka_config, &settings.dead_letter_topic)
                        .map_err(|e| {
                            IndexingError::config(format!(
                                "Failed to create dead-letter producer: {}",
                                e
                            ))
                        })?;
                    PoisonHandler::Park(Arc::new(producer))
                }
            };

            let dispatcher = EventDispatcher::new(Arc::clone(&translators), gateway);
            let reader = BrokerReader::new(Box::new(consumer), dispatcher, supervisor.subscribe())
                .with_worker_id(worker_id)
                .with_config(settings.reader_config())
                .with_poison_handler(poison);

            supervisor.add_reader(reader);
            info!(worker_id = worker_id, "Reader initialized");
        }

        Ok(Self { supervisor })
    }

    /// Create the index and alias, retrying per connection mode while
    /// OpenSearch is unreachable.
    async fn ensure_index(
        gateway: &SyncGateway,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<(), IndexingError> {
        loop {
            match gateway.ensure_index_exists().await {
                Ok(()) => return Ok(()),
                Err(e) if mode == ConnectionMode::Retry && e.is_transient() => {
                    warn!(
                        error = %e,
                        retry_interval_secs = retry_interval.as_secs(),
                        "OpenSearch unavailable, retrying..."
                    );
                    sleep(retry_interval).await;
                }
                Err(e) => {
                    return Err(IndexingError::config(format!(
                        "Failed to ensure index exists: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        loop {
            match OpenSearchProvider::new(url, index_config.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}
