//! Bounded event queue.
//!
//! The queue holds events waiting for delivery in FIFO order. It never
//! grows past its capacity: whenever an insertion would exceed the bound,
//! events are evicted from the head (oldest first). The queue itself is a
//! plain data structure; the delivery worker and the tracker share it
//! behind a mutex and every operation here completes without awaiting.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Maximum accepted length of an event name.
pub const MAX_EVENT_NAME_LEN: usize = 256;

/// A single tracked user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier, stable across retries so collectors can dedupe.
    pub event_id: String,

    /// Event name (e.g. "question_asked", "pageview").
    pub name: String,

    /// Custom properties.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,

    /// Creation time, ISO-8601 UTC with millisecond precision.
    pub timestamp: String,

    /// URL of the page the event originated from.
    pub page_url: String,

    /// Host/client description (the user agent analog).
    pub client_context: String,

    /// Number of failed delivery attempts so far.
    #[serde(default)]
    pub attempt: u32,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            properties: HashMap::new(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            page_url: String::new(),
            client_context: String::new(),
            attempt: 0,
        }
    }

    pub fn properties(mut self, properties: HashMap<String, serde_json::Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = url.into();
        self
    }

    pub fn client_context(mut self, context: impl Into<String>) -> Self {
        self.client_context = context.into();
        self
    }
}

/// Whether `name` is acceptable as an event name.
pub fn is_valid_event_name(name: &str) -> bool {
    !name.trim().is_empty() && name.len() <= MAX_EVENT_NAME_LEN
}

/// Events taken from the head of the queue for one delivery attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryBatch {
    events: Vec<Event>,
}

impl DeliveryBatch {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Names in batch order.
    pub fn names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Bounded FIFO of pending events with drop-oldest overflow.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<Event>,
    max_size: usize,
    evicted: u64,
}

impl EventQueue {
    /// Create a queue holding at most `max_size` events (minimum 1).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            events: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            evicted: 0,
        }
    }

    /// Append to the tail, evicting from the head while over capacity.
    ///
    /// Returns the number of events evicted.
    pub fn enqueue(&mut self, event: Event) -> usize {
        self.events.push_back(event);
        self.evict_overflow()
    }

    /// Remove up to `max_batch_size` events from the head.
    pub fn drain(&mut self, max_batch_size: usize) -> DeliveryBatch {
        let count = max_batch_size.min(self.events.len());
        DeliveryBatch::new(self.events.drain(..count).collect())
    }

    /// Remove everything.
    pub fn drain_all(&mut self) -> DeliveryBatch {
        DeliveryBatch::new(self.events.drain(..).collect())
    }

    /// Put a failed batch back at the head in its original order, then
    /// re-apply the overflow policy.
    ///
    /// Returns the number of events evicted.
    pub fn requeue_front(&mut self, batch: DeliveryBatch) -> usize {
        for event in batch.into_events().into_iter().rev() {
            self.events.push_front(event);
        }
        self.evict_overflow()
    }

    fn evict_overflow(&mut self) -> usize {
        let mut evicted = 0;
        while self.events.len() > self.max_size {
            if let Some(event) = self.events.pop_front() {
                tracing::trace!(event = %event.name, "Event queue full, evicting oldest event");
                evicted += 1;
            }
        }
        self.evicted += evicted as u64;
        evicted
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.max_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Total events evicted by the overflow policy over the queue's life.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Copy of the queued events, head first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
