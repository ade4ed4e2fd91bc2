//! Environment-driven settings.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use cdc_indexer_repository::opensearch::IndexConfig;
use cdc_indexer_repository::SyncGatewayConfig;
use cdc_kafka::KafkaConfig;
use tracing::warn;

use crate::reader::{PoisonPolicy, ReaderConfig};
use crate::supervisor::SupervisorConfig;

const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";
const DEFAULT_KAFKA_TOPICS: &str = "cdc.public.organizations,cdc.public.jobs,cdc.public.events";
const DEFAULT_KAFKA_GROUP_ID: &str = "cdc-indexer";
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_INDEX_ALIAS: &str = "documents";
const DEFAULT_DEAD_LETTER_TOPIC: &str = "cdc-indexer.dead-letter";
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_READER_WORKERS: usize = 1;
const DEFAULT_SYNC_MAX_RETRIES: usize = 5;
const DEFAULT_SYNC_RETRY_BASE_MS: u64 = 100;
const DEFAULT_SYNC_RETRY_MAX_MS: u64 = 10_000;
const DEFAULT_RECONNECT_ATTEMPTS: usize = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 10;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection every retry interval until successful.
    #[default]
    Retry,
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Ok(Self::FailFast),
            "retry" => Ok(Self::Retry),
            other => Err(format!("unknown connection mode '{}'", other)),
        }
    }
}

/// Process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub kafka_broker: String,
    pub kafka_topics: Vec<String>,
    pub kafka_group_id: String,
    pub kafka_username: Option<String>,
    pub kafka_password: Option<String>,
    pub kafka_ssl_ca_pem: Option<String>,
    pub opensearch_url: String,
    pub index_alias: String,
    pub index_version: u32,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub request_timeout: Duration,
    pub source_versioning: bool,
    pub reader_workers: usize,
    pub max_retries: usize,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub poison_policy: PoisonPolicy,
    pub dead_letter_topic: String,
    pub reconnect_attempts: usize,
    pub shutdown_grace: Duration,
    pub progress_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_TOPICS`: Comma-separated CDC topics
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: cdc-indexer)
    /// - `KAFKA_USERNAME` / `KAFKA_PASSWORD` / `KAFKA_SSL_CA_PEM`: SASL/SSL, plaintext when unset
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `INDEX_ALIAS` / `INDEX_VERSION`: Index alias and version (default: documents / 0)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Connection retry interval (default: 15)
    /// - `OPENSEARCH_REQUEST_TIMEOUT_MS`: Per-call timeout (default: 10000)
    /// - `OPENSEARCH_SOURCE_VERSIONING`: Version documents by source timestamp (default: true)
    /// - `READER_WORKERS`: Number of readers (default: 1)
    /// - `SYNC_MAX_RETRIES`, `SYNC_RETRY_BASE_MS`, `SYNC_RETRY_MAX_MS`: Transient retry budget
    /// - `POISON_POLICY`: "skip" or "park" (default: skip)
    /// - `DEAD_LETTER_TOPIC`: Topic for parked messages
    /// - `BROKER_RECONNECT_ATTEMPTS`: Reconnect attempts before giving up (default: 10)
    /// - `SHUTDOWN_GRACE_SECS`: Time readers get to finish on shutdown (default: 30)
    /// - `PROGRESS_INTERVAL_SECS`: Progress log interval (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`. Invalid values log a warning and fall
    /// back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let mut kafka_topics = split_list(&string("KAFKA_TOPICS", DEFAULT_KAFKA_TOPICS));
        if kafka_topics.is_empty() {
            warn!("KAFKA_TOPICS is empty, using defaults");
            kafka_topics = split_list(DEFAULT_KAFKA_TOPICS);
        }

        let mut reader_workers = parse_or(var("READER_WORKERS"), "READER_WORKERS", DEFAULT_READER_WORKERS);
        if reader_workers == 0 {
            warn!("READER_WORKERS must be at least 1, using 1");
            reader_workers = 1;
        }

        Self {
            kafka_broker: string("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            kafka_topics,
            kafka_group_id: string("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            kafka_username: var("KAFKA_USERNAME"),
            kafka_password: var("KAFKA_PASSWORD"),
            kafka_ssl_ca_pem: var("KAFKA_SSL_CA_PEM"),
            opensearch_url: string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            index_alias: string("INDEX_ALIAS", DEFAULT_INDEX_ALIAS),
            index_version: parse_or(var("INDEX_VERSION"), "INDEX_VERSION", 0),
            connection_mode: parse_or(
                var("OPENSEARCH_CONNECTION_MODE"),
                "OPENSEARCH_CONNECTION_MODE",
                ConnectionMode::Retry,
            ),
            retry_interval: Duration::from_secs(parse_or(
                var("OPENSEARCH_RETRY_INTERVAL_SECS"),
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            request_timeout: Duration::from_millis(
                parse_or(
                    var("OPENSEARCH_REQUEST_TIMEOUT_MS"),
                    "OPENSEARCH_REQUEST_TIMEOUT_MS",
                    DEFAULT_REQUEST_TIMEOUT_MS,
                )
                .max(1),
            ),
            source_versioning: parse_bool_or(
                var("OPENSEARCH_SOURCE_VERSIONING"),
                "OPENSEARCH_SOURCE_VERSIONING",
                true,
            ),
            reader_workers,
            max_retries: parse_or(var("SYNC_MAX_RETRIES"), "SYNC_MAX_RETRIES", DEFAULT_SYNC_MAX_RETRIES),
            retry_base: Duration::from_millis(parse_or(
                var("SYNC_RETRY_BASE_MS"),
                "SYNC_RETRY_BASE_MS",
                DEFAULT_SYNC_RETRY_BASE_MS,
            )),
            retry_max: Duration::from_millis(parse_or(
                var("SYNC_RETRY_MAX_MS"),
                "SYNC_RETRY_MAX_MS",
                DEFAULT_SYNC_RETRY_MAX_MS,
            )),
            poison_policy: parse_or(var("POISON_POLICY"), "POISON_POLICY", PoisonPolicy::Skip),
            dead_letter_topic: string("DEAD_LETTER_TOPIC", DEFAULT_DEAD_LETTER_TOPIC),
            reconnect_attempts: parse_or(
                var("BROKER_RECONNECT_ATTEMPTS"),
                "BROKER_RECONNECT_ATTEMPTS",
                DEFAULT_RECONNECT_ATTEMPTS,
            ),
            shutdown_grace: Duration::from_secs(parse_or(
                var("SHUTDOWN_GRACE_SECS"),
                "SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )),
            progress_interval: Duration::from_secs(
                parse_or(
                    var("PROGRESS_INTERVAL_SECS"),
                    "PROGRESS_INTERVAL_SECS",
                    DEFAULT_PROGRESS_INTERVAL_SECS,
                )
                .max(1),
            ),
        }
    }

    /// Kafka client settings for one worker. Workers share the group id and
    /// get distinct client ids.
    pub fn kafka_config(&self, worker_id: usize) -> KafkaConfig {
        let mut config = KafkaConfig::new(&self.kafka_broker, &self.kafka_group_id)
            .with_client_id(format!("{}-{}", self.kafka_group_id, worker_id));

        if let (Some(username), Some(password)) = (&self.kafka_username, &self.kafka_password) {
            config = config.with_credentials(username.clone(), password.clone());
        }
        if let Some(ca_pem) = &self.kafka_ssl_ca_pem {
            config = config.with_ssl_ca(ca_pem.clone());
        }
        config
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig::new(&self.index_alias, self.index_version)
            .with_source_versioning(self.source_versioning)
    }

    pub fn gateway_config(&self) -> SyncGatewayConfig {
        SyncGatewayConfig::with_request_timeout(self.request_timeout)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            max_retries: self.max_retries,
            retry_base: self.retry_base,
            retry_max: self.retry_max,
            reconnect_attempts: self.reconnect_attempts,
            ..ReaderConfig::default()
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            shutdown_grace: self.shutdown_grace,
            progress_interval: self.progress_interval,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key = key, value = %raw, error = %e, "Invalid setting, using default");
                default
            }
        },
    }
}

fn parse_bool_or(value: Option<String>, key: &str, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        None => default,
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                warn!(key = key, value = %v, "Invalid boolean setting, using default");
                default
            }
        },
    }
}
