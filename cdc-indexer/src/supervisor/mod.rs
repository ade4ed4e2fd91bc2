//! Process supervisor.
//!
//! Runs one task per broker reader, fans the shutdown signal out to all of
//! them, and reports aggregate progress while they run.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{interval, sleep_until, Duration, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::errors::IngestError;
use crate::reader::{BrokerReader, ReaderStats, StatsSnapshot};

const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long readers may take to finish their in-flight message.
    pub shutdown_grace: Duration,
    /// Interval between progress logs; clamped to at least one millisecond.
    pub progress_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(30),
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Owns the readers and their lifecycle.
///
/// The supervisor:
/// - Spawns every reader on its own task
/// - Broadcasts shutdown on SIGINT/SIGTERM or when a reader fails
/// - Aborts readers still running after the grace period
/// - Logs progress totals and rates
pub struct Supervisor {
    readers: Vec<BrokerReader>,
    stats: Vec<Arc<ReaderStats>>,
    shutdown_tx: broadcast::Sender<()>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            readers: Vec::new(),
            stats: Vec::new(),
            shutdown_tx,
            config,
        }
    }

    /// A shutdown receiver for a reader owned by this supervisor.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// A handle that can trigger shutdown from outside `run`.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn add_reader(&mut self, reader: BrokerReader) {
        self.stats.push(reader.stats());
        self.readers.push(reader);
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// Run all readers until they stop.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every reader stopped cleanly
    /// * `Err(IngestError)` - The first reader error, or `WorkerError` for a panicked task
    #[instrument(skip(self), fields(readers = self.readers.len()))]
    pub async fn run(mut self) -> Result<(), IngestError> {
        info!("Starting supervisor");

        let mut tasks = JoinSet::new();
        for reader in self.readers.drain(..) {
            let worker_id = reader.worker_id();
            tasks.spawn(async move { (worker_id, reader.run().await) });
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let signal = shutdown_signal();
        tokio::pin!(signal);

        let mut progress_timer =
            interval(self.config.progress_interval.max(MIN_PROGRESS_INTERVAL));
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        progress_timer.tick().await;

        let mut prev = StatsSnapshot::default();
        let mut prev_time = Instant::now();

        let mut first_error: Option<IngestError> = None;
        let mut deadline: Option<tokio::time::Instant> = None;
        let mut aborted = false;

        while !tasks.is_empty() {
            tokio::select! {
                joined = tasks.join_next() => {
                    let failure = match joined {
                        Some(Ok((worker_id, Ok(())))) => {
                            info!(worker_id = worker_id, "Reader stopped");
                            None
                        }
                        Some(Ok((worker_id, Err(e)))) => {
                            error!(worker_id = worker_id, error = %e, "Reader failed");
                            Some(e)
                        }
                        Some(Err(e)) if e.is_cancelled() => {
                            warn!("Reader aborted");
                            None
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Reader task panicked");
                            Some(IngestError::WorkerError(e.to_string()))
                        }
                        None => break,
                    };

                    if let Some(e) = failure {
                        first_error.get_or_insert(e);
                        if deadline.is_none() {
                            deadline = Some(self.begin_shutdown());
                        }
                    }
                }
                _ = &mut signal, if deadline.is_none() => {
                    info!("Received shutdown signal");
                    deadline = Some(self.begin_shutdown());
                }
                _ = shutdown_rx.recv(), if deadline.is_none() => {
                    deadline = Some(tokio::time::Instant::now() + self.config.shutdown_grace);
                }
                _ = sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)), if deadline.is_some() && !aborted => {
                    warn!(
                        grace_secs = self.config.shutdown_grace.as_secs(),
                        remaining = tasks.len(),
                        "Shutdown grace period elapsed, aborting readers"
                    );
                    tasks.abort_all();
                    aborted = true;
                }
                _ = progress_timer.tick() => {
                    let now = Instant::now();
                    let current = self.totals();
                    log_progress(&prev, &current, now.duration_since(prev_time).as_secs_f64());
                    prev = current;
                    prev_time = now;
                }
            }
        }

        let totals = self.totals();
        info!(
            messages = totals.messages,
            upserts = totals.upserts,
            deletes = totals.deletes,
            skipped = totals.skipped,
            failures = totals.failures(),
            "Supervisor shutdown complete"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn begin_shutdown(&self) -> tokio::time::Instant {
        let _ = self.shutdown_tx.send(());
        tokio::time::Instant::now() + self.config.shutdown_grace
    }

    /// Counters summed across readers.
    pub fn totals(&self) -> StatsSnapshot {
        self.stats.iter().map(|s| s.snapshot()).sum()
    }
}

fn log_progress(prev: &StatsSnapshot, current: &StatsSnapshot, elapsed_secs: f64) {
    let rate = |now: u64, before: u64| {
        if elapsed_secs > 0.0 {
            (now.saturating_sub(before) as f64) / elapsed_secs
        } else {
            0.0
        }
    };

    info!(
        messages = current.messages,
        upserts = current.upserts,
        deletes = current.deletes,
        skipped = current.skipped,
        failures = current.failures(),
        retries = current.retries,
        messages_per_sec = format!("{:.2}", rate(current.messages, prev.messages)),
        upserts_per_sec = format!("{:.2}", rate(current.upserts, prev.upserts)),
        "Processing progress"
    );
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
