//! Delivery counters and subscriber callbacks.
//!
//! Telemetry failures never reach the caller of `track()`. Instead the
//! tracker keeps counters (readable through [`TrackerStats::snapshot`]) and
//! pushes [`TrackerSignal`]s to any subscribed callbacks.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ErrorCode;

/// Why events were permanently discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Evicted from the head of a full queue.
    QueueOverflow,
    /// Failed more than `max_retries` times.
    RetryLimit,
    /// Final teardown delivery failed.
    Teardown,
}

impl DropReason {
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            DropReason::QueueOverflow => Some(ErrorCode::EventQueueOverflow),
            DropReason::RetryLimit => Some(ErrorCode::EventRetryLimit),
            DropReason::Teardown => None,
        }
    }
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerSignal {
    /// A batch was confirmed by the collector.
    Delivered { count: usize },
    /// A confirmable delivery attempt failed. `message` is sanitized.
    DeliveryFailed {
        count: usize,
        code: ErrorCode,
        message: String,
    },
    /// Events were permanently lost.
    Dropped { reason: DropReason, count: usize },
    /// Scheduled flushes are deferred for `delay`.
    RetryScheduled { delay: Duration, attempt: u32 },
    /// A batch was handed to the best-effort transport.
    BeaconDispatched { count: usize, accepted: bool },
}

pub type SignalCallback = Arc<dyn Fn(&TrackerSignal) + Send + Sync>;

/// Point-in-time copy of the tracker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub tracked: u64,
    pub delivered: u64,
    pub failed_attempts: u64,
    pub retries_scheduled: u64,
    pub dropped_overflow: u64,
    pub dropped_retry_limit: u64,
    pub dropped_teardown: u64,
    pub beacon_sent: u64,
    pub pending: usize,
}

impl StatsSnapshot {
    /// Every event lost for any reason.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_overflow + self.dropped_retry_limit + self.dropped_teardown
    }
}

/// Counters and subscribers shared by the tracker and its worker.
#[derive(Default)]
pub struct TrackerStats {
    tracked: AtomicU64,
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    retries_scheduled: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_retry_limit: AtomicU64,
    dropped_teardown: AtomicU64,
    beacon_sent: AtomicU64,
    subscribers: RwLock<Vec<SignalCallback>>,
}

impl TrackerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: SignalCallback) {
        self.subscribers.write().push(callback);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn emit(&self, signal: TrackerSignal) {
        // Callbacks may re-enter the tracker; never call them under the lock.
        let subscribers: Vec<SignalCallback> = self.subscribers.read().clone();
        for callback in subscribers {
            callback(&signal);
        }
    }

    pub(crate) fn record_tracked(&self) {
        self.tracked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, count: usize) {
        self.delivered.fetch_add(count as u64, Ordering::Relaxed);
        self.emit(TrackerSignal::Delivered { count });
    }

    pub(crate) fn record_failure(&self, count: usize, code: ErrorCode, message: String) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        self.emit(TrackerSignal::DeliveryFailed {
            count,
            code,
            message,
        });
    }

    pub(crate) fn record_retry(&self, delay: Duration, attempt: u32) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        self.emit(TrackerSignal::RetryScheduled { delay, attempt });
    }

    pub(crate) fn record_dropped(&self, reason: DropReason, count: usize) {
        if count == 0 {
            return;
        }
        let counter = match reason {
            DropReason::QueueOverflow => &self.dropped_overflow,
            DropReason::RetryLimit => &self.dropped_retry_limit,
            DropReason::Teardown => &self.dropped_teardown,
        };
        counter.fetch_add(count as u64, Ordering::Relaxed);
        match reason.error_code() {
            Some(code) => tracing::warn!("Dropped {} events [{}]", count, code),
            None => tracing::debug!("Dropped {} events during teardown", count),
        }
        self.emit(TrackerSignal::Dropped { reason, count });
    }

    pub(crate) fn record_beacon(&self, count: usize, accepted: bool) {
        self.beacon_sent.fetch_add(count as u64, Ordering::Relaxed);
        self.emit(TrackerSignal::BeaconDispatched { count, accepted });
    }

    /// Copy the counters; `pending` is supplied by the caller.
    pub fn snapshot(&self, pending: usize) -> StatsSnapshot {
        StatsSnapshot {
            tracked: self.tracked.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_retry_limit: self.dropped_retry_limit.load(Ordering::Relaxed),
            dropped_teardown: self.dropped_teardown.load(Ordering::Relaxed),
            beacon_sent: self.beacon_sent.load(Ordering::Relaxed),
            pending,
        }
    }
}

impl std::fmt::Debug for TrackerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerStats")
            .field("counters", &self.snapshot(0))
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
