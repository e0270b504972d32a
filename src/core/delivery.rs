//! Background delivery worker.
//!
//! A single task owns every confirmable delivery attempt, so at most one
//! batch is in flight per tracker. It wakes on:
//!
//! - the periodic flush tick
//! - a flush command (queue reached capacity, or an explicit `flush()`)
//! - expiry of the retry backoff
//! - shutdown, which performs one final single-attempt flush
//!
//! Flush commands that pile up while an attempt is in flight are coalesced
//! into the next cycle. Scheduled flushes (tick, queue-full) are skipped
//! while a backoff is pending; explicit flushes are not.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::event_queue::{DeliveryBatch, EventQueue};
use super::retry::{RetryController, RetryPolicy};
use crate::error::sanitizer::{redact_secret, sanitize_message};
use crate::error::{ErrorCode, TrackerError};
use crate::http::Transports;
use crate::observer::{DropReason, TrackerStats};

/// Capacity of the command channel between the tracker and its worker.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// About 30 years. Deadlines that would overflow `Instant` land here.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + delay`, saturating at [`FAR_FUTURE`].
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

/// What caused a flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Interval,
    QueueFull,
    Manual,
    Retry,
    Teardown,
}

impl FlushTrigger {
    /// Scheduled triggers wait out a pending backoff.
    fn respects_backoff(&self) -> bool {
        matches!(self, FlushTrigger::Interval | FlushTrigger::QueueFull)
    }
}

/// Summary of one flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Events confirmed by the collector.
    pub delivered: usize,
    /// Events in the batch whose attempt failed.
    pub failed: usize,
    /// Events permanently dropped during the cycle.
    pub dropped: usize,
    /// Code of the failure that ended the cycle, if any.
    pub error: Option<ErrorCode>,
    /// Set when the cycle was skipped because a backoff is pending.
    pub deferred: bool,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn merge(&mut self, other: &FlushReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.dropped += other.dropped;
        self.error = self.error.or(other.error);
        self.deferred |= other.deferred;
    }
}

pub(crate) enum Command {
    Flush {
        trigger: FlushTrigger,
        reply: Option<oneshot::Sender<FlushReport>>,
    },
    Shutdown {
        reply: oneshot::Sender<FlushReport>,
    },
}

/// State shared between the tracker handle and its worker.
pub(crate) struct Shared {
    pub queue: Mutex<EventQueue>,
    pub stats: Arc<TrackerStats>,
    /// Set while a queue-full flush command is outstanding.
    pub flush_requested: AtomicBool,
}

impl Shared {
    pub fn new(max_queue_size: usize, stats: Arc<TrackerStats>) -> Self {
        Self {
            queue: Mutex::new(EventQueue::new(max_queue_size)),
            stats,
            flush_requested: AtomicBool::new(false),
        }
    }
}

pub(crate) struct WorkerSettings {
    pub flush_interval: Duration,
    pub max_batch_size: usize,
    pub retry_policy: RetryPolicy,
    pub api_key: String,
}

pub(crate) struct DeliveryWorker {
    shared: Arc<Shared>,
    transports: Transports,
    commands: mpsc::Receiver<Command>,
    flush_interval: Duration,
    max_batch_size: usize,
    retry: RetryController,
    backoff_until: Option<Instant>,
    api_key: String,
}

impl DeliveryWorker {
    pub fn new(
        shared: Arc<Shared>,
        transports: Transports,
        commands: mpsc::Receiver<Command>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            shared,
            transports,
            commands,
            flush_interval: settings.flush_interval,
            max_batch_size: settings.max_batch_size.max(1),
            retry: RetryController::new(settings.retry_policy),
            backoff_until: None,
            api_key: settings.api_key,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let start = deadline_after(self.flush_interval);
        let mut ticker = interval_at(start, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            "Delivery worker started with flush interval {:?}",
            self.flush_interval
        );

        loop {
            let backoff_until = self.backoff_until;
            let backoff_expired = async move {
                match backoff_until {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Flush { trigger, reply }) => {
                        if self.handle_flush(trigger, reply).await {
                            break;
                        }
                    }
                    Some(Command::Shutdown { reply }) => {
                        let report = self.shutdown().await;
                        let _ = reply.send(report);
                        break;
                    }
                    None => {
                        tracing::debug!("Tracker handle dropped, delivery worker exiting");
                        break;
                    }
                },
                _ = backoff_expired => {
                    self.backoff_until = None;
                    self.flush_cycle(FlushTrigger::Retry).await;
                }
                _ = ticker.tick() => {
                    self.flush_cycle(FlushTrigger::Interval).await;
                }
            }
        }

        tracing::debug!("Delivery worker stopped");
    }

    /// Run one coalesced cycle for `trigger` and every flush command already
    /// waiting in the channel. Returns true if a shutdown was processed.
    async fn handle_flush(
        &mut self,
        trigger: FlushTrigger,
        reply: Option<oneshot::Sender<FlushReport>>,
    ) -> bool {
        let mut replies: Vec<oneshot::Sender<FlushReport>> = reply.into_iter().collect();
        let mut effective = trigger;
        let mut shutdown = None;

        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Flush { trigger, reply } => {
                    if trigger == FlushTrigger::Manual {
                        effective = FlushTrigger::Manual;
                    }
                    replies.extend(reply);
                }
                Command::Shutdown { reply } => {
                    shutdown = Some(reply);
                    break;
                }
            }
        }

        if replies.len() > 1 {
            tracing::trace!("Coalesced {} flush requests", replies.len());
        }

        let report = self.flush_cycle(effective).await;
        for reply in replies {
            let _ = reply.send(report.clone());
        }

        match shutdown {
            Some(reply) => {
                let report = self.shutdown().await;
                let _ = reply.send(report);
                true
            }
            None => false,
        }
    }

    fn in_backoff(&self) -> bool {
        self.backoff_until
            .map_or(false, |deadline| Instant::now() < deadline)
    }

    /// Deliver the events queued when the cycle starts, batch by batch,
    /// stopping at the first failure.
    pub(crate) async fn flush_cycle(&mut self, trigger: FlushTrigger) -> FlushReport {
        // Any cycle satisfies an outstanding queue-full request.
        self.shared.flush_requested.store(false, Ordering::SeqCst);

        let mut report = FlushReport::default();

        if trigger.respects_backoff() && self.in_backoff() {
            report.deferred = true;
            return report;
        }

        let mut remaining = self.shared.queue.lock().len();
        if remaining > 0 {
            tracing::debug!("Flushing {} events ({:?})", remaining, trigger);
        }

        while remaining > 0 {
            let batch = self
                .shared
                .queue
                .lock()
                .drain(self.max_batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            remaining = remaining.saturating_sub(batch.len());

            let outcome = self.deliver(batch).await;
            report.merge(&outcome);
            if !outcome.is_success() {
                break;
            }
        }

        report
    }

    /// One confirmable attempt for `batch`.
    async fn deliver(&mut self, batch: DeliveryBatch) -> FlushReport {
        let count = batch.len();
        let mut report = FlushReport::default();
        let result = self.transports.confirmable.send(&batch).await;

        match result {
            Ok(()) => {
                self.retry.on_success();
                self.backoff_until = None;
                self.shared.stats.record_delivered(count);
                report.delivered = count;
            }
            Err(error) => {
                let message = self.sanitize(&error);
                if error.is_recoverable() {
                    tracing::warn!("Failed to deliver {} events: [{}] {}", count, error.code, message);
                } else {
                    tracing::error!(
                        "Collector rejected {} events: [{}] {}",
                        count,
                        error.code,
                        message
                    );
                }
                self.shared.stats.record_failure(count, error.code, message);

                let decision = self.retry.on_failure(batch);
                let exhausted = decision.dropped.len();
                let evicted = self.shared.queue.lock().requeue_front(decision.requeue);

                self.shared
                    .stats
                    .record_dropped(DropReason::RetryLimit, exhausted);
                self.shared
                    .stats
                    .record_dropped(DropReason::QueueOverflow, evicted);

                self.backoff_until = Some(deadline_after(decision.delay));
                self.shared
                    .stats
                    .record_retry(decision.delay, self.retry.consecutive_failures());
                tracing::debug!("Next delivery attempt in {:?}", decision.delay);

                report.failed = count;
                report.dropped = exhausted + evicted;
                report.error = Some(error.code);
            }
        }

        report
    }

    /// Final flush: every queued batch gets exactly one attempt.
    async fn shutdown(&mut self) -> FlushReport {
        tracing::debug!("Delivery worker shutting down");
        self.backoff_until = None;

        let mut report = FlushReport::default();
        loop {
            let batch = self.shared.queue.lock().drain(self.max_batch_size);
            if batch.is_empty() {
                break;
            }
            let count = batch.len();

            match self.transports.confirmable.send(&batch).await {
                Ok(()) => {
                    self.shared.stats.record_delivered(count);
                    report.delivered += count;
                }
                Err(error) => {
                    let message = self.sanitize(&error);
                    tracing::warn!(
                        "Final flush lost {} events: [{}] {}",
                        count,
                        error.code,
                        message
                    );
                    self.shared.stats.record_failure(count, error.code, message);
                    self.shared.stats.record_dropped(DropReason::Teardown, count);
                    report.failed += count;
                    report.dropped += count;
                    report.error = report.error.or(Some(error.code));
                }
            }
        }

        report
    }

    fn sanitize(&self, error: &TrackerError) -> String {
        redact_secret(&sanitize_message(&error.message), &self.api_key)
    }
}
