use reqwest::Url;
use std::time::Duration;

use crate::error::{ErrorCode, Result, TrackerError};

pub const DEFAULT_ENDPOINT: &str = "https://api.your-domain.com/ingest";
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Value stamped into `clientContext` when the host does not provide one.
pub fn default_client_context() -> String {
    format!("adscouter-rust/{}", env!("CARGO_PKG_VERSION"))
}

/// Returns the collection URL for a local mock ingest server.
pub fn local_endpoint(port: u16) -> String {
    format!("http://localhost:{}/ingest", port)
}

/// Tracker configuration. Immutable once the tracker is started.
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub api_key: String,
    pub endpoint: String,
    pub flush_interval: Duration,
    pub max_queue_size: usize,
    pub max_batch_size: usize,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
    pub local_port: Option<u16>,
    pub page_url: Option<String>,
    pub client_context: Option<String>,
    pub enabled: bool,
    pub sample_rate: f64,
    pub track_page_view_on_init: bool,
}

impl Default for TrackerOptions {
    /// Default options with no API key; pass the key to [`crate::init`].
    fn default() -> Self {
        TrackerOptionsBuilder::new("").build()
    }
}

impl TrackerOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        TrackerOptionsBuilder::new(api_key).build()
    }

    pub fn builder(api_key: impl Into<String>) -> TrackerOptionsBuilder {
        TrackerOptionsBuilder::new(api_key)
    }

    /// Same options with a different API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// The URL batches are posted to, with `local_port` taking precedence.
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = match self.local_port {
            Some(port) => local_endpoint(port),
            None => self.endpoint.clone(),
        };

        let url = Url::parse(&raw).map_err(|e| {
            TrackerError::with_source(
                ErrorCode::ConfigInvalidUrl,
                format!("Invalid endpoint URL: {}", raw),
                e,
            )
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(TrackerError::config_error(
                ErrorCode::ConfigInvalidUrl,
                format!("Unsupported endpoint scheme: {}", other),
            )),
        }
    }

    pub fn client_context(&self) -> String {
        self.client_context
            .clone()
            .unwrap_or_else(default_client_context)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(TrackerError::config_error(
                ErrorCode::ConfigMissingApiKey,
                "API key is required",
            ));
        }

        self.endpoint_url()?;

        if self.flush_interval.is_zero() {
            return Err(TrackerError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "Flush interval must be positive",
            ));
        }

        if self.max_queue_size == 0 {
            return Err(TrackerError::config_error(
                ErrorCode::ConfigInvalidQueueSize,
                "Max queue size must be positive",
            ));
        }

        if self.max_batch_size == 0 {
            return Err(TrackerError::config_error(
                ErrorCode::ConfigInvalidBatchSize,
                "Max batch size must be positive",
            ));
        }

        if self.max_delay < self.base_delay {
            return Err(TrackerError::config_error(
                ErrorCode::ConfigInvalidBackoff,
                "Max delay must not be shorter than base delay",
            ));
        }

        if self.timeout.is_zero() {
            return Err(TrackerError::config_error(
                ErrorCode::ConfigInvalidTimeout,
                "Request timeout must be positive",
            ));
        }

        Ok(())
    }
}

pub struct TrackerOptionsBuilder {
    api_key: String,
    endpoint: String,
    flush_interval: Duration,
    max_queue_size: usize,
    max_batch_size: usize,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    timeout: Duration,
    local_port: Option<u16>,
    page_url: Option<String>,
    client_context: Option<String>,
    enabled: bool,
    sample_rate: f64,
    track_page_view_on_init: bool,
}

impl TrackerOptionsBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            timeout: DEFAULT_TIMEOUT,
            local_port: None,
            page_url: None,
            client_context: None,
            enabled: true,
            sample_rate: 1.0,
            track_page_view_on_init: false,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn flush_interval_ms(self, millis: u64) -> Self {
        self.flush_interval(Duration::from_millis(millis))
    }

    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send to `http://localhost:{port}/ingest` instead of the endpoint.
    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    pub fn page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }

    pub fn client_context(mut self, context: impl Into<String>) -> Self {
        self.client_context = Some(context.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fraction of tracked events that are kept, clamped to `0.0..=1.0`.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn track_page_view_on_init(mut self, enabled: bool) -> Self {
        self.track_page_view_on_init = enabled;
        self
    }

    pub fn build(self) -> TrackerOptions {
        TrackerOptions {
            api_key: self.api_key,
            endpoint: self.endpoint,
            flush_interval: self.flush_interval,
            max_queue_size: self.max_queue_size,
            max_batch_size: self.max_batch_size,
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            timeout: self.timeout,
            local_port: self.local_port,
            page_url: self.page_url,
            client_context: self.client_context,
            enabled: self.enabled,
            sample_rate: self.sample_rate,
            track_page_view_on_init: self.track_page_view_on_init,
        }
    }
}
