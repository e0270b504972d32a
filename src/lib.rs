//! Ad-Scouter AI analytics tracker.
//!
//! Records user-interaction events and delivers them in batches to the
//! Ad-Scouter collection endpoint. Delivery failures are retried with
//! exponential backoff, the in-memory queue is bounded (oldest events are
//! dropped first), and pending events can be pushed out on a best-effort
//! transport when the host is going away.
//!
//! # Quick Start
//!
//! ```no_run
//! use adscouter::TrackerOptions;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> adscouter::Result<()> {
//!     let options = TrackerOptions {
//!         page_url: Some("https://shop.example.com/".to_string()),
//!         ..Default::default()
//!     };
//!     let tracker = adscouter::init("your_api_key", options)?;
//!
//!     let mut properties = HashMap::new();
//!     properties.insert("question".to_string(), serde_json::json!("shipping times"));
//!     tracker.track("question_asked", Some(properties));
//!
//!     // Deliver what is left and stop the background worker.
//!     tracker.teardown().await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod error;
pub mod http;
pub mod observer;
mod client;

pub use crate::core::{
    DeliveryBatch, Event, EventQueue, FlushReport, FlushTrigger, RetryController, RetryDecision,
    RetryPolicy, TrackerOptions, TrackerOptionsBuilder,
};

pub use error::{ErrorCode, Result, TrackerError};

pub use http::{
    BeaconTransport, HttpBeacon, HttpTransport, SendFuture, SettleFuture, Transport, Transports,
};

pub use observer::{DropReason, SignalCallback, StatsSnapshot, TrackerSignal};

pub use client::{SharedTracker, Tracker, DEFAULT_BEACON_GRACE, PAGE_VIEW_EVENT, SDK_VERSION};

use std::sync::atomic::{AtomicBool, Ordering};

static GLOBAL_TRACKER_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether a tracker created by [`init`] is currently live.
pub fn is_initialized() -> bool {
    GLOBAL_TRACKER_ACTIVE.load(Ordering::SeqCst)
}

/// Initialize the process-wide tracker with HTTP delivery.
///
/// `api_key` replaces any key already set on `options`.
///
/// # Errors
///
/// Returns a configuration error if the API key is empty, the options are
/// invalid, or a tracker from a previous `init` has not been torn down.
pub fn init(api_key: impl Into<String>, options: TrackerOptions) -> Result<Tracker> {
    let options = options.with_api_key(api_key);
    options.validate()?;
    claim_global_slot()?;

    let tracker = Transports::http(&options).and_then(|t| Tracker::start(options, t));
    finish_init(tracker)
}

/// Like [`init`], delivering through the given transports.
pub fn init_with_transports(
    api_key: impl Into<String>,
    options: TrackerOptions,
    transports: Transports,
) -> Result<Tracker> {
    let options = options.with_api_key(api_key);
    options.validate()?;
    claim_global_slot()?;

    finish_init(Tracker::start(options, transports))
}

fn claim_global_slot() -> Result<()> {
    GLOBAL_TRACKER_ACTIVE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .map(|_| ())
        .map_err(|_| TrackerError::already_initialized())
}

fn finish_init(tracker: Result<Tracker>) -> Result<Tracker> {
    match tracker {
        Ok(tracker) => {
            tracker.mark_global();
            Ok(tracker)
        }
        Err(e) => {
            release_global_slot();
            Err(e)
        }
    }
}

pub(crate) fn release_global_slot() {
    GLOBAL_TRACKER_ACTIVE.store(false, Ordering::SeqCst);
}
