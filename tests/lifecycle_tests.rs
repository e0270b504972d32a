//! Process-wide `init`/`teardown` lifecycle.
//!
//! The global slot is shared by every test in a binary, so the whole
//! lifecycle is exercised in a single test.

use adscouter::{
    BeaconTransport, DeliveryBatch, ErrorCode, SendFuture, TrackerOptions, Transport, Transports,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingTransport {
    delivered: AtomicUsize,
}

impl Transport for CountingTransport {
    fn send<'a>(&'a self, batch: &'a DeliveryBatch) -> SendFuture<'a> {
        Box::pin(async move {
            self.delivered.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        })
    }
}

struct DiscardBeacon;

impl BeaconTransport for DiscardBeacon {
    fn send_beacon(&self, _batch: DeliveryBatch) -> bool {
        true
    }
}

fn options() -> TrackerOptions {
    TrackerOptions {
        flush_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_global_lifecycle() {
    let transport = Arc::new(CountingTransport::default());
    let transports = || Transports::new(transport.clone(), Arc::new(DiscardBeacon));

    // Invalid options never claim the slot.
    let err = adscouter::init_with_transports("", options(), transports()).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigMissingApiKey);
    assert!(!adscouter::is_initialized());

    // The key argument wins over a key already on the options.
    let keyed = TrackerOptions::builder("from_options").build();
    let err = adscouter::init_with_transports("  ", keyed, transports()).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigMissingApiKey);
    assert!(!adscouter::is_initialized());

    let tracker = adscouter::init_with_transports("key1", options(), transports()).unwrap();
    assert!(adscouter::is_initialized());
    assert_eq!(tracker.options().api_key, "key1");

    let err = adscouter::init_with_transports("key2", options(), transports()).unwrap_err();
    assert_eq!(err.code, ErrorCode::InitAlreadyInitialized);
    assert!(tracker.is_running());

    tracker.track("a", None);
    tracker.track("b", None);
    let report = tracker.teardown().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(transport.delivered.load(Ordering::SeqCst), 2);
    assert!(!adscouter::is_initialized());

    // A second teardown is a no-op and leaves the slot free.
    tracker.teardown().await.unwrap();
    drop(tracker);

    // Re-init after teardown, then release the slot by dropping.
    let tracker = adscouter::init_with_transports("key3", options(), transports()).unwrap();
    assert!(adscouter::is_initialized());
    drop(tracker);
    assert!(!adscouter::is_initialized());

    // The HTTP entry point claims the same slot.
    let tracker = adscouter::init("key4", options()).unwrap();
    assert!(adscouter::is_initialized());
    let err = adscouter::init("key5", options()).unwrap_err();
    assert_eq!(err.code, ErrorCode::InitAlreadyInitialized);
    tracker.teardown().await.unwrap();
    assert!(!adscouter::is_initialized());
}
