//! Retry ceiling and exponential backoff for failed deliveries.
//!
//! A failed batch is not retried in place. Each event's `attempt` counter
//! is bumped, events past the ceiling are dropped, and the survivors go
//! back to the head of the queue. The delivery worker then holds off
//! scheduled flushes until the backoff delay has elapsed.

use std::time::Duration;

use super::config::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES};
use super::event_queue::{DeliveryBatch, Event};

/// Retry limits and backoff bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts an event may accumulate before it is dropped. Default: 3
    pub max_retries: u32,

    /// Backoff base. Default: 1 second
    pub base_delay: Duration,

    /// Backoff ceiling. Default: 30 seconds
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// `min(base_delay * 2^attempt, max_delay)`, saturating at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether an event with this many failed attempts must be dropped.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_retries
    }
}

/// Outcome of handing a failed batch to the controller.
#[derive(Debug, Default)]
pub struct RetryDecision {
    /// Events to put back at the head of the queue, in original order.
    pub requeue: DeliveryBatch,

    /// Events that exceeded the retry ceiling.
    pub dropped: Vec<Event>,

    /// How long scheduled flushes should wait before the next attempt.
    pub delay: Duration,
}

/// Tracks the current failure streak and applies the retry policy.
#[derive(Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    consecutive_failures: u32,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a successful delivery, ending any failure streak.
    pub fn on_success(&mut self) {
        if self.consecutive_failures > 0 {
            tracing::debug!(
                "Delivery recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// Record a failed delivery of `batch`.
    pub fn on_failure(&mut self, batch: DeliveryBatch) -> RetryDecision {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let mut requeue = Vec::with_capacity(batch.len());
        let mut dropped = Vec::new();

        for mut event in batch.into_events() {
            event.attempt = event.attempt.saturating_add(1);
            if self.policy.is_exhausted(event.attempt) {
                dropped.push(event);
            } else {
                requeue.push(event);
            }
        }

        let delay = self.policy.backoff_delay(self.consecutive_failures);

        RetryDecision {
            requeue: DeliveryBatch::new(requeue),
            dropped,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(names: &[&str]) -> DeliveryBatch {
        DeliveryBatch::new(names.iter().map(|n| Event::new(*n)).collect())
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_exponential() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(60));

        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(policy.backoff_delay(3), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_monotonic() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250), Duration::from_secs(30));
        let delays: Vec<_> = (0..50).map(|n| policy.backoff_delay(n)).collect();

        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_failure_requeues_under_ceiling() {
        let mut controller = RetryController::new(RetryPolicy::new(
            1,
            Duration::from_millis(10),
            Duration::from_secs(1),
        ));

        let decision = controller.on_failure(batch(&["a", "b"]));
        assert_eq!(decision.requeue.names(), vec!["a", "b"]);
        assert!(decision.requeue.events().iter().all(|e| e.attempt == 1));
        assert!(decision.dropped.is_empty());
        assert_eq!(decision.delay, Duration::from_millis(20));
        assert_eq!(controller.consecutive_failures(), 1);
    }

    #[test]
    fn test_failure_drops_past_ceiling() {
        let mut controller = RetryController::new(RetryPolicy::new(
            1,
            Duration::from_millis(10),
            Duration::from_secs(1),
        ));

        let first = controller.on_failure(batch(&["a"]));
        let second = controller.on_failure(first.requeue);

        assert!(second.requeue.is_empty());
        assert_eq!(second.dropped.len(), 1);
        assert_eq!(second.dropped[0].attempt, 2);
        assert_eq!(second.delay, Duration::from_millis(40));
    }

    #[test]
    fn test_zero_retries_drops_immediately() {
        let mut controller = RetryController::new(RetryPolicy::new(
            0,
            Duration::from_millis(10),
            Duration::from_secs(1),
        ));

        let decision = controller.on_failure(batch(&["a", "b"]));
        assert!(decision.requeue.is_empty());
        assert_eq!(decision.dropped.len(), 2);
    }

    #[test]
    fn test_success_resets_streak() {
        let mut controller = RetryController::new(RetryPolicy::default());
        controller.on_failure(batch(&["a"]));
        controller.on_failure(batch(&["b"]));
        assert_eq!(controller.consecutive_failures(), 2);

        controller.on_success();
        assert_eq!(controller.consecutive_failures(), 0);
    }

    #[test]
    fn test_mixed_attempts_in_batch() {
        let mut controller = RetryController::new(RetryPolicy::new(
            2,
            Duration::from_millis(10),
            Duration::from_secs(1),
        ));

        let mut events = vec![Event::new("old"), Event::new("new")];
        events[0].attempt = 2;
        let decision = controller.on_failure(DeliveryBatch::new(events));

        assert_eq!(decision.dropped.len(), 1);
        assert_eq!(decision.dropped[0].name, "old");
        assert_eq!(decision.requeue.names(), vec!["new"]);
    }
}
