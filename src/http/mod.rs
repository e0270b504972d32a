mod client;
pub mod transport;

pub use client::{encode_batch, status_to_error, HttpBeacon, HttpTransport, USER_AGENT};
pub use transport::{BeaconTransport, SendFuture, SettleFuture, Transport, Transports};
