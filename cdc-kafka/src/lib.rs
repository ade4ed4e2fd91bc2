//! Shared Kafka utilities for the CDC indexer.
//!
//! This crate provides the Kafka client configuration used by the change
//! event consumer and by the dead-letter producer.
//!
//! ## Usage
//!
//! ```ignore
//! use cdc_kafka::{create_consumer, create_producer, KafkaConfig};
//!
//! let config = KafkaConfig::new("localhost:9092", "cdc-indexer")
//!     .with_client_id("cdc-indexer-0");
//! let consumer = create_consumer(&config)?;
//! let producer = create_producer(&config)?;
//! ```

use anyhow::Result;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::StreamConsumer;
use rdkafka::producer::FutureProducer;

/// Configuration for creating Kafka clients.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Kafka broker addresses (comma-separated)
    pub broker: String,
    /// Consumer group ID
    pub group_id: String,
    /// Client ID reported to the broker
    pub client_id: String,
    /// SASL username (enables SASL/SSL if set)
    pub username: Option<String>,
    /// SASL password (required if username is set)
    pub password: Option<String>,
    /// Custom CA certificate in PEM format
    pub ssl_ca_pem: Option<String>,
}

impl KafkaConfig {
    /// Create a new KafkaConfig with the given broker and group id.
    ///
    /// The client id defaults to the group id.
    pub fn new(broker: impl Into<String>, group_id: impl Into<String>) -> Self {
        let group_id = group_id.into();
        Self {
            broker: broker.into(),
            client_id: group_id.clone(),
            group_id,
            username: None,
            password: None,
            ssl_ca_pem: None,
        }
    }

    /// Set the client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set SASL credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Set custom CA certificate.
    pub fn with_ssl_ca(mut self, ca_pem: String) -> Self {
        self.ssl_ca_pem = Some(ca_pem);
        self
    }
}

/// Enable SASL/SSL when credentials are provided.
///
/// Without credentials the client stays on plaintext (for local development).
fn apply_security(client_config: &mut ClientConfig, config: &KafkaConfig) {
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        client_config
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);

        if let Some(ca_pem) = &config.ssl_ca_pem {
            client_config.set("ssl.ca.pem", ca_pem);
        }
    }
}

/// Client configuration for a change event consumer.
///
/// Offsets are committed manually, only after a message has been applied to
/// the index, so auto-commit is off.
pub fn consumer_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config
        .set("bootstrap.servers", &config.broker)
        .set("group.id", &config.group_id)
        .set("client.id", &config.client_id)
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000");

    apply_security(&mut client_config, config);
    client_config
}

/// Client configuration for a producer that must not lose or duplicate records.
pub fn producer_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config
        .set("bootstrap.servers", &config.broker)
        .set("client.id", &config.client_id)
        .set("compression.type", "zstd")
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .set("message.timeout.ms", "5000");

    apply_security(&mut client_config, config);
    client_config
}

/// Create a Kafka consumer with the given configuration.
pub fn create_consumer(config: &KafkaConfig) -> Result<StreamConsumer> {
    Ok(consumer_client_config(config).create()?)
}

/// Create a Kafka producer with the given configuration.
pub fn create_producer(config: &KafkaConfig) -> Result<FutureProducer> {
    Ok(producer_client_config(config).create()?)
}

// Re-export commonly used rdkafka types for convenience
pub use rdkafka::message::{Header, OwnedHeaders};
pub use rdkafka::producer::FutureRecord;
