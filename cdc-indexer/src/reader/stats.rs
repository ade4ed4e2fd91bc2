//! Per-reader counters.

use std::iter::Sum;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters a reader updates as it settles messages.
///
/// Shared with the supervisor through an `Arc` for progress logging.
#[derive(Debug, Default)]
pub struct ReaderStats {
    messages: AtomicU64,
    upserts: AtomicU64,
    deletes: AtomicU64,
    ignored: AtomicU64,
    skipped: AtomicU64,
    retries: AtomicU64,
    poisoned: AtomicU64,
    permanent_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl ReaderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upsert(&self) {
        self.upserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poisoned(&self) {
        self.poisoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_permanent_failure(&self) {
        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            upserts: self.upserts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            poisoned: self.poisoned.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ReaderStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub upserts: u64,
    pub deletes: u64,
    pub ignored: u64,
    pub skipped: u64,
    pub retries: u64,
    pub poisoned: u64,
    pub permanent_failures: u64,
    pub reconnects: u64,
}

impl StatsSnapshot {
    /// Messages that failed to reach the index.
    pub fn failures(&self) -> u64 {
        self.poisoned + self.permanent_failures
    }
}

impl Add for StatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            messages: self.messages + other.messages,
            upserts: self.upserts + other.upserts,
            deletes: self.deletes + other.deletes,
            ignored: self.ignored + other.ignored,
            skipped: self.skipped + other.skipped,
            retries: self.retries + other.retries,
            poisoned: self.poisoned + other.poisoned,
            permanent_failures: self.permanent_failures + other.permanent_failures,
            reconnects: self.reconnects + other.reconnects,
        }
    }
}

impl Sum for StatsSnapshot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
