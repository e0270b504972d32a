use parking_lot::Mutex;
use reqwest::{Client, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use super::transport::{BeaconTransport, SendFuture, SettleFuture, Transport, Transports};
use crate::core::{DeliveryBatch, TrackerOptions};
use crate::error::{ErrorCode, Result, TrackerError};

pub const USER_AGENT: &str = concat!("adscouter-rust/", env!("CARGO_PKG_VERSION"));

/// Upper bound on how much of an error response body ends up in messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Serialize a batch as the JSON array the collector expects.
pub fn encode_batch(batch: &DeliveryBatch) -> Result<Vec<u8>> {
    serde_json::to_vec(batch.events()).map_err(|e| {
        TrackerError::with_source(
            ErrorCode::EventSerializationFailed,
            "Failed to serialize event batch",
            e,
        )
    })
}

fn build_client(options: &TrackerOptions) -> Result<Client> {
    Client::builder()
        .timeout(options.timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| {
            TrackerError::with_source(ErrorCode::NetworkError, "Failed to create HTTP client", e)
        })
}

/// Confirmable HTTP POST transport.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl HttpTransport {
    pub fn new(options: &TrackerOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(options)?,
            endpoint: options.endpoint_url()?,
            api_key: options.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn do_post(&self, batch: &DeliveryBatch) -> Result<()> {
        let body = encode_batch(batch)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(convert_error)?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!("Collector accepted {} events with {}", batch.len(), status);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_to_error(status, &body))
        }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, batch: &'a DeliveryBatch) -> SendFuture<'a> {
        Box::pin(self.do_post(batch))
    }
}

/// Fire-and-forget HTTP transport.
///
/// Requests are spawned onto the runtime that created the beacon and may
/// outlive the tracker. A runtime shutdown cancels whatever is still in
/// flight, so call [`BeaconTransport::settle`] before leaving the runtime.
pub struct HttpBeacon {
    client: Client,
    endpoint: Url,
    api_key: String,
    runtime: tokio::runtime::Handle,
    in_flight: Mutex<JoinSet<()>>,
}

impl HttpBeacon {
    /// Must be called from within a Tokio runtime.
    pub fn new(options: &TrackerOptions) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TrackerError::with_source(
                ErrorCode::InitNoRuntime,
                "Beacon transport requires a Tokio runtime",
                e,
            )
        })?;

        Ok(Self {
            client: build_client(options)?,
            endpoint: options.endpoint_url()?,
            api_key: options.api_key.clone(),
            runtime,
            in_flight: Mutex::new(JoinSet::new()),
        })
    }
}

impl BeaconTransport for HttpBeacon {
    fn send_beacon(&self, batch: DeliveryBatch) -> bool {
        let body = match encode_batch(&batch) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Beacon rejected: {}", e);
                return false;
            }
        };

        let request = self
            .client
            .post(self.endpoint.clone())
            .header("X-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .body(body);
        let count = batch.len();

        let dispatch = async move {
            match request.send().await {
                Ok(response) => {
                    tracing::trace!("Beacon of {} events answered {}", count, response.status())
                }
                Err(e) => tracing::debug!("Beacon of {} events failed: {}", count, e),
            }
        };

        let mut in_flight = self.in_flight.lock();
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn_on(dispatch, &self.runtime);

        true
    }

    fn settle(&self, grace: Duration) -> SettleFuture<'_> {
        let mut pending = std::mem::take(&mut *self.in_flight.lock());
        Box::pin(async move {
            let drained = tokio::time::timeout(grace, async {
                while pending.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                tracing::debug!("{} beacons still in flight after {:?}", pending.len(), grace);
                pending.detach_all();
            }
        })
    }
}

impl Transports {
    /// reqwest-backed confirmable and beacon transports for `options`.
    pub fn http(options: &TrackerOptions) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpTransport::new(options)?),
            Arc::new(HttpBeacon::new(options)?),
        ))
    }
}

/// Map a non-2xx response to a delivery error.
pub fn status_to_error(status: StatusCode, body: &str) -> TrackerError {
    let (code, category) = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            (ErrorCode::HttpUnauthorized, "Authentication Error")
        }
        StatusCode::TOO_MANY_REQUESTS => (ErrorCode::HttpRateLimited, "Rate Limited"),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            (ErrorCode::HttpTimeout, "Timeout")
        }
        s if s.is_server_error() => (ErrorCode::HttpServerError, "Server Error"),
        s if s.is_client_error() => (ErrorCode::HttpClientError, "Client Error"),
        _ => (ErrorCode::HttpUnexpectedStatus, "Unexpected Status"),
    };

    let body: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
    TrackerError::delivery_error(
        code,
        format!("{}: {} - {}", category, status.as_u16(), body.trim()),
    )
}

fn convert_error(error: reqwest::Error) -> TrackerError {
    if error.is_timeout() {
        TrackerError::with_source(ErrorCode::HttpTimeout, "Request timed out", error)
    } else if error.is_connect() {
        TrackerError::with_source(ErrorCode::HttpNetworkError, "Connection failed", error)
    } else {
        TrackerError::with_source(ErrorCode::NetworkError, error.to_string(), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Event;

    #[test]
    fn test_encode_batch_is_json_array() {
        let batch = DeliveryBatch::new(vec![Event::new("a"), Event::new("b")]);
        let body = encode_batch(&batch).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["name"], "a");
        assert_eq!(array[1]["name"], "b");
    }

    #[test]
    fn test_status_to_error_codes() {
        assert_eq!(
            status_to_error(StatusCode::INTERNAL_SERVER_ERROR, "").code,
            ErrorCode::HttpServerError
        );
        assert_eq!(
            status_to_error(StatusCode::SERVICE_UNAVAILABLE, "").code,
            ErrorCode::HttpServerError
        );
        assert_eq!(
            status_to_error(StatusCode::TOO_MANY_REQUESTS, "").code,
            ErrorCode::HttpRateLimited
        );
        assert_eq!(
            status_to_error(StatusCode::UNAUTHORIZED, "").code,
            ErrorCode::HttpUnauthorized
        );
        assert_eq!(
            status_to_error(StatusCode::BAD_REQUEST, "").code,
            ErrorCode::HttpClientError
        );
        assert_eq!(
            status_to_error(StatusCode::MULTIPLE_CHOICES, "").code,
            ErrorCode::HttpUnexpectedStatus
        );
    }

    #[test]
    fn test_status_to_error_truncates_body() {
        let body = "x".repeat(1000);
        let error = status_to_error(StatusCode::BAD_GATEWAY, &body);
        assert!(error.message.len() < 300);
        assert!(error.message.starts_with("Server Error: 502"));
    }

    #[test]
    fn test_http_transport_uses_local_port() {
        let options = TrackerOptions::builder("key").local_port(5000).build();
        let transport = HttpTransport::new(&options).unwrap();
        assert_eq!(transport.endpoint().as_str(), "http://localhost:5000/ingest");
    }

    #[test]
    fn test_beacon_requires_runtime() {
        let options = TrackerOptions::new("key");
        let err = HttpBeacon::new(&options).err().unwrap();
        assert_eq!(err.code, ErrorCode::InitNoRuntime);
    }

    #[tokio::test]
    async fn test_beacon_inside_runtime() {
        let options = TrackerOptions::new("key");
        assert!(HttpBeacon::new(&options).is_ok());
    }
}
