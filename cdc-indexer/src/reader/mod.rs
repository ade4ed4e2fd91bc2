//! Broker reader.
//!
//! One reader per worker. It pulls a message, decodes it, dispatches it and
//! only then commits its offset, so a crash in between replays the message
//! instead of dropping it.

mod poison;
mod stats;

pub use poison::{PoisonAction, PoisonHandler, PoisonPolicy, PoisonSink};
pub use stats::{ReaderStats, StatsSnapshot};

use std::sync::Arc;
use std::time::Duration;

use cdc_indexer_shared::{ChangeEnvelope, EnvelopeError};
use tokio::sync::broadcast;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::{MessageSource, SourceMessage};
use crate::dispatcher::{DispatchOutcome, EventDispatcher};
use crate::errors::IngestError;

/// Retry and reconnect settings for a reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Retries for a transient sync failure before the poison policy applies.
    pub max_retries: usize,
    /// First retry delay, also the pause after a non-fatal receive error.
    pub retry_base: Duration,
    pub retry_max: Duration,
    /// Reconnect attempts before the reader gives up.
    pub reconnect_attempts: usize,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_base: Duration::from_millis(100),
            retry_max: Duration::from_secs(10),
            reconnect_attempts: 10,
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

impl ReaderConfig {
    fn retry_delays(&self) -> impl Iterator<Item = Duration> {
        backoff(self.retry_base, self.retry_max, self.max_retries)
    }

    fn reconnect_delays(&self) -> impl Iterator<Item = Duration> {
        backoff(
            self.reconnect_base,
            self.reconnect_max,
            self.reconnect_attempts,
        )
    }
}

/// Jittered exponential delays: `base`, `2 * base`, `4 * base`, ... capped at `max`.
fn backoff(base: Duration, max: Duration, attempts: usize) -> impl Iterator<Item = Duration> {
    let factor = (base.as_millis() as u64 / 2).max(1);
    ExponentialBackoff::from_millis(2)
        .factor(factor)
        .max_delay(max)
        .map(jitter)
        .take(attempts)
}

/// How the loop continues after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// The message is settled; commit it.
    Settled,
    /// Shutdown arrived mid-message; leave it uncommitted.
    Interrupted,
}

/// The per-worker read/dispatch/commit loop.
pub struct BrokerReader {
    worker_id: usize,
    source: Box<dyn MessageSource>,
    dispatcher: EventDispatcher,
    config: ReaderConfig,
    poison: PoisonHandler,
    stats: Arc<ReaderStats>,
    shutdown: broadcast::Receiver<()>,
}

impl BrokerReader {
    pub fn new(
        source: Box<dyn MessageSource>,
        dispatcher: EventDispatcher,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            worker_id: 0,
            source,
            dispatcher,
            config: ReaderConfig::default(),
            poison: PoisonHandler::default(),
            stats: Arc::new(ReaderStats::new()),
            shutdown,
        }
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_poison_handler(mut self, poison: PoisonHandler) -> Self {
        self.poison = poison;
        self
    }

    pub fn with_worker_id(mut self, worker_id: usize) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Counters for this reader.
    pub fn stats(&self) -> Arc<ReaderStats> {
        Arc::clone(&self.stats)
    }

    /// Run until shutdown, source exhaustion, or an unrecoverable broker loss.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - On shutdown or when the source ends
    /// * `Err(IngestError::BrokerConnectionLost)` - If reconnecting failed
    #[instrument(skip(self), fields(worker_id = self.worker_id))]
    pub async fn run(mut self) -> Result<(), IngestError> {
        info!(poison_policy = %self.poison.policy(), "Starting broker reader");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!("Reader received shutdown signal");
                    break;
                }
                next = self.source.next_message() => next,
            };

            match next {
                Ok(Some(message)) => {
                    if self.process(&message).await == Flow::Interrupted {
                        info!(
                            topic = %message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            "Shutdown during backoff, leaving message uncommitted"
                        );
                        break;
                    }
                    self.commit(&message).await;
                }
                Ok(None) => {
                    info!("Message source ended");
                    break;
                }
                Err(IngestError::BrokerConnectionLost(reason)) => {
                    if self.reconnect(reason).await? == Flow::Interrupted {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to receive message");
                    if self.sleep_or_shutdown(self.config.retry_base).await {
                        break;
                    }
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            messages = stats.messages,
            upserts = stats.upserts,
            deletes = stats.deletes,
            skipped = stats.skipped,
            failures = stats.failures(),
            "Broker reader stopped"
        );
        Ok(())
    }

    /// Decode and apply one message.
    async fn process(&mut self, message: &SourceMessage) -> Flow {
        self.stats.record_message();

        if message.is_tombstone() {
            debug!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Skipping tombstone"
            );
            self.stats.record_ignored();
            return Flow::Settled;
        }
        let payload = message.payload.as_deref().unwrap_or_default();

        match ChangeEnvelope::decode(payload) {
            Ok(envelope) => self.apply(message, &envelope).await,
            Err(EnvelopeError::UnsupportedOperation(code)) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    op = %code,
                    "Skipping unsupported operation"
                );
                self.stats.record_skipped();
                Flow::Settled
            }
            Err(e) => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Skipping malformed envelope"
                );
                self.stats.record_skipped();
                Flow::Settled
            }
        }
    }

    /// Dispatch with retries for transient failures.
    async fn apply(&mut self, message: &SourceMessage, envelope: &ChangeEnvelope) -> Flow {
        let mut delays = self.config.retry_delays();
        let mut attempt = 0;

        loop {
            let err = match self.dispatcher.dispatch(envelope).await {
                Ok(outcome) => {
                    self.record_outcome(&outcome);
                    return Flow::Settled;
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                self.settle_failure(message, err);
                return Flow::Settled;
            }

            let Some(delay) = delays.next() else {
                self.stats.record_poisoned();
                let action = self.poison.handle(message, &err).await;
                debug!(action = ?action, attempts = attempt + 1, "Poison message settled");
                return Flow::Settled;
            };

            attempt += 1;
            self.stats.record_retry();
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                table = %envelope.table,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient sync failure, retrying"
            );

            if self.sleep_or_shutdown(delay).await {
                return Flow::Interrupted;
            }
        }
    }

    fn record_outcome(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Upserted { document_id } => {
                debug!(document_id = %document_id, "Upserted document");
                self.stats.record_upsert();
            }
            DispatchOutcome::Deleted { document_id } => {
                debug!(document_id = %document_id, "Deleted document");
                self.stats.record_delete();
            }
            DispatchOutcome::Ignored { operation } => {
                debug!(operation = %operation, "Ignored envelope");
                self.stats.record_ignored();
            }
        }
    }

    /// Log a failure that retrying cannot fix.
    fn settle_failure(&self, message: &SourceMessage, err: IngestError) {
        match err {
            IngestError::UnknownTable(table) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    table = %table,
                    "Skipping event for table without translator"
                );
                self.stats.record_skipped();
            }
            IngestError::PermanentSyncFailure {
                document_id,
                document,
                source,
            } => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    document_id = %document_id,
                    document = document.as_deref().unwrap_or("<none>"),
                    error = %source,
                    "Index rejected document, skipping"
                );
                self.stats.record_permanent_failure();
            }
            other => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %other,
                    "Skipping message"
                );
                self.stats.record_skipped();
            }
        }
    }

    async fn commit(&mut self, message: &SourceMessage) {
        if let Err(e) = self.source.commit(message).await {
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }

    /// Reconnect with bounded backoff.
    async fn reconnect(&mut self, reason: String) -> Result<Flow, IngestError> {
        warn!(error = %reason, "Broker connection lost, reconnecting");

        let mut attempt = 0;
        for delay in self.config.reconnect_delays() {
            attempt += 1;
            if self.sleep_or_shutdown(delay).await {
                return Ok(Flow::Interrupted);
            }

            match self.source.reconnect().await {
                Ok(()) => {
                    self.stats.record_reconnect();
                    info!(attempt = attempt, "Broker connection restored");
                    return Ok(Flow::Settled);
                }
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }

        error!(attempts = attempt, "Giving up on broker connection");
        Err(IngestError::BrokerConnectionLost(reason))
    }

    /// Sleep for `delay`; returns true if shutdown arrived first.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.recv() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
