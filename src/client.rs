use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::delivery::{Command, DeliveryWorker, Shared, WorkerSettings};
use crate::core::{
    is_valid_event_name, DeliveryBatch, Event, FlushReport, FlushTrigger, RetryPolicy,
    TrackerOptions, COMMAND_CHANNEL_CAPACITY,
};
use crate::error::{ErrorCode, Result, TrackerError};
use crate::http::Transports;
use crate::observer::{DropReason, SignalCallback, StatsSnapshot, TrackerSignal, TrackerStats};

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the event recorded by `track_page_view_on_init`.
pub const PAGE_VIEW_EVENT: &str = "pageview";

/// How long unload and teardown wait for dispatched beacons.
pub const DEFAULT_BEACON_GRACE: Duration = Duration::from_secs(2);

/// Handle to a running tracker.
///
/// `track()` only enqueues; delivery happens on a background task owned by
/// the tracker. Call [`Tracker::teardown`] to deliver what is left and stop
/// that task.
pub struct Tracker {
    options: TrackerOptions,
    shared: Arc<Shared>,
    transports: Transports,
    commands: mpsc::Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    holds_global_slot: AtomicBool,
    client_context: String,
}

impl Tracker {
    /// Start a tracker delivering through `transports`.
    ///
    /// Unlike [`crate::init`] this does not claim the process-wide slot, so
    /// any number of trackers may be started this way.
    pub fn start(options: TrackerOptions, transports: Transports) -> Result<Self> {
        options.validate()?;

        tokio::runtime::Handle::try_current().map_err(|e| {
            TrackerError::with_source(
                ErrorCode::InitNoRuntime,
                "Tracker must be started inside a Tokio runtime",
                e,
            )
        })?;

        let shared = Arc::new(Shared::new(
            options.max_queue_size,
            Arc::new(TrackerStats::new()),
        ));
        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let worker = DeliveryWorker::new(
            Arc::clone(&shared),
            transports.clone(),
            receiver,
            WorkerSettings {
                flush_interval: options.flush_interval,
                max_batch_size: options.max_batch_size,
                retry_policy: RetryPolicy::new(
                    options.max_retries,
                    options.base_delay,
                    options.max_delay,
                ),
                api_key: options.api_key.clone(),
            },
        )
        .spawn();

        let tracker = Self {
            client_context: options.client_context(),
            options,
            shared,
            transports,
            commands,
            worker: Mutex::new(Some(worker)),
            running: AtomicBool::new(true),
            holds_global_slot: AtomicBool::new(false),
        };

        if tracker.options.track_page_view_on_init {
            let mut properties = HashMap::new();
            if let Some(ref url) = tracker.options.page_url {
                properties.insert("url".to_string(), serde_json::Value::from(url.clone()));
            }
            tracker.track(PAGE_VIEW_EVENT, Some(properties));
        }

        Ok(tracker)
    }

    /// Start a tracker with the reqwest-backed transports.
    pub fn start_http(options: TrackerOptions) -> Result<Self> {
        let transports = Transports::http(&options)?;
        Self::start(options, transports)
    }

    pub(crate) fn mark_global(&self) {
        self.holds_global_slot.store(true, Ordering::SeqCst);
    }

    fn release_global(&self) {
        if self.holds_global_slot.swap(false, Ordering::SeqCst) {
            crate::release_global_slot();
        }
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Record an event. Never blocks and never fails.
    ///
    /// Events are silently ignored when the tracker is disabled, stopped,
    /// sampled out, or the name is empty or longer than 256 bytes.
    pub fn track(
        &self,
        event_name: impl Into<String>,
        properties: Option<HashMap<String, serde_json::Value>>,
    ) {
        if !self.options.enabled || !self.is_running() {
            return;
        }

        if self.options.sample_rate < 1.0 && rand::random::<f64>() >= self.options.sample_rate {
            return;
        }

        let event_name = event_name.into();
        if !is_valid_event_name(&event_name) {
            tracing::warn!("Invalid event name: {:?}", event_name);
            return;
        }

        let event = Event::new(event_name)
            .properties(properties.unwrap_or_default())
            .page_url(self.options.page_url.clone().unwrap_or_default())
            .client_context(self.client_context.clone());

        tracing::trace!(event = %event.name, "Tracking event");

        let (evicted, full) = {
            let mut queue = self.shared.queue.lock();
            let evicted = queue.enqueue(event);
            (evicted, queue.is_full())
        };

        self.shared.stats.record_tracked();
        if evicted > 0 {
            self.shared
                .stats
                .record_dropped(DropReason::QueueOverflow, evicted);
        }

        if full {
            self.request_flush();
        }
    }

    /// Ask the worker for a flush unless one is already outstanding.
    fn request_flush(&self) {
        if self.shared.flush_requested.swap(true, Ordering::SeqCst) {
            return;
        }

        let command = Command::Flush {
            trigger: FlushTrigger::QueueFull,
            reply: None,
        };
        if self.commands.try_send(command).is_err() {
            self.shared.flush_requested.store(false, Ordering::SeqCst);
        }
    }

    /// Flush now and wait for the outcome.
    ///
    /// Delivery failures are reported in the returned [`FlushReport`], not
    /// as errors; an error means the worker is no longer running.
    pub async fn flush(&self) -> Result<FlushReport> {
        if !self.is_running() {
            return Err(TrackerError::worker_stopped());
        }

        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Flush {
                trigger: FlushTrigger::Manual,
                reply: Some(reply),
            })
            .await
            .map_err(|_| TrackerError::worker_stopped())?;

        outcome.await.map_err(|_| TrackerError::worker_stopped())
    }

    /// Hand everything queued to the best-effort transport.
    ///
    /// Call this when the host is hiding or unloading. Returns immediately
    /// with the number of events dispatched; the queue is empty afterwards.
    pub fn page_hide(&self) -> usize {
        let batch = self.shared.queue.lock().drain_all();
        if batch.is_empty() {
            return 0;
        }

        let total = batch.len();
        let batch_size = self.options.max_batch_size.max(1);
        let mut events = batch.into_events();

        while !events.is_empty() {
            let rest = events.split_off(batch_size.min(events.len()));
            let chunk = DeliveryBatch::new(events);
            let count = chunk.len();
            let accepted = self.transports.beacon.send_beacon(chunk);
            if !accepted {
                tracing::debug!("Beacon transport declined {} events", count);
            }
            self.shared.stats.record_beacon(count, accepted);
            events = rest;
        }

        tracing::debug!("Dispatched {} events on page hide", total);
        total
    }

    /// Wait up to `grace` for beacons dispatched by [`Tracker::page_hide`].
    pub async fn settle_beacons(&self, grace: Duration) {
        self.transports.beacon.settle(grace).await;
    }

    /// Call [`Tracker::page_hide`] once `signal` resolves.
    ///
    /// The listener holds only a weak reference, so it does not keep the
    /// tracker alive. The returned handle completes once the beacons have
    /// settled or [`DEFAULT_BEACON_GRACE`] has passed.
    ///
    /// ```no_run
    /// # async fn run() -> adscouter::Result<()> {
    /// use std::sync::Arc;
    ///
    /// let tracker = Arc::new(adscouter::init("key", adscouter::TrackerOptions::default())?);
    /// let unload = tracker.watch_unload(async {
    ///     let _ = tokio::signal::ctrl_c().await;
    /// });
    /// let _ = unload.await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn watch_unload<F>(self: &Arc<Self>, signal: F) -> JoinHandle<()>
    where
        F: Future + Send + 'static,
    {
        let tracker = Arc::downgrade(self);
        tokio::spawn(async move {
            signal.await;
            let beacon = match tracker.upgrade() {
                Some(tracker) => {
                    tracker.page_hide();
                    Arc::clone(&tracker.transports.beacon)
                }
                None => return,
            };
            beacon.settle(DEFAULT_BEACON_GRACE).await;
        })
    }

    /// Stop the worker after one final delivery of everything queued.
    ///
    /// An attempt already in flight is allowed to finish. Queued events get
    /// a single attempt each; failures are dropped, not retried. Beacons
    /// still in flight get up to [`DEFAULT_BEACON_GRACE`]. Calling teardown
    /// twice is a no-op.
    pub async fn teardown(&self) -> Result<FlushReport> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(FlushReport::default());
        }

        let (reply, outcome) = oneshot::channel();
        let report = match self.commands.send(Command::Shutdown { reply }).await {
            Ok(()) => outcome.await.unwrap_or_default(),
            Err(_) => FlushReport::default(),
        };

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!("Delivery worker ended abnormally: {}", e);
            }
        }

        let leftover = {
            let mut queue = self.shared.queue.lock();
            let leftover = queue.len();
            queue.clear();
            leftover
        };
        self.shared
            .stats
            .record_dropped(DropReason::Teardown, leftover);

        self.settle_beacons(DEFAULT_BEACON_GRACE).await;
        self.release_global();
        tracing::debug!("Tracker torn down");

        Ok(report)
    }

    /// Register a callback for delivery and drop notifications.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&TrackerSignal) + Send + Sync + 'static,
    {
        let callback: SignalCallback = Arc::new(callback);
        self.shared.stats.subscribe(callback);
    }

    pub fn stats(&self) -> StatsSnapshot {
        let pending = self.shared.queue.lock().len();
        self.shared.stats.snapshot(pending)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Copy of the pending events, oldest first.
    pub fn pending_events(&self) -> Vec<Event> {
        self.shared.queue.lock().snapshot()
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        // Dropping the command sender lets the worker finish its current
        // attempt and exit on its own.
        self.running.store(false, Ordering::SeqCst);
        self.release_global();
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("endpoint", &self.options.endpoint)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

pub type SharedTracker = Arc<Tracker>;
