//! Delivery capabilities.
//!
//! Two ways of getting a batch to the collector exist, selected by the
//! caller's context rather than by inspecting the environment:
//!
//! - [`Transport`] is confirmable. The delivery worker awaits it and acts
//!   on the outcome (discard on success, retry controller on failure).
//! - [`BeaconTransport`] is fire-and-forget. It is used while the host is
//!   going away, must return without waiting on the network, and its
//!   outcome is treated as success.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::core::DeliveryBatch;
use crate::error::Result;

/// Future returned by a confirmable send.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Future returned by [`BeaconTransport::settle`].
pub type SettleFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Confirmable delivery: resolves to `Ok(())` only on a 2xx response.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, batch: &'a DeliveryBatch) -> SendFuture<'a>;
}

/// Best-effort delivery for host teardown.
pub trait BeaconTransport: Send + Sync {
    /// Queue `batch` for delivery without blocking.
    ///
    /// Returns whether the batch was accepted for dispatch. Acceptance says
    /// nothing about whether the collector received it.
    fn send_beacon(&self, batch: DeliveryBatch) -> bool;

    /// Wait up to `grace` for dispatched beacons to leave the process.
    ///
    /// Beacons still in flight after `grace` are left running. The default
    /// returns immediately.
    fn settle(&self, _grace: Duration) -> SettleFuture<'_> {
        Box::pin(async {})
    }
}

/// The pair of transports a tracker delivers through.
#[derive(Clone)]
pub struct Transports {
    pub confirmable: Arc<dyn Transport>,
    pub beacon: Arc<dyn BeaconTransport>,
}

impl Transports {
    pub fn new(confirmable: Arc<dyn Transport>, beacon: Arc<dyn BeaconTransport>) -> Self {
        Self {
            confirmable,
            beacon,
        }
    }
}

impl std::fmt::Debug for Transports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transports").finish_non_exhaustive()
    }
}
