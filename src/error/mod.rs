use thiserror::Error;

pub mod sanitizer;

pub use sanitizer::{redact_secret, sanitize_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Initialization errors
    InitAlreadyInitialized,
    InitNoRuntime,

    // Configuration errors
    ConfigMissingApiKey,
    ConfigInvalidUrl,
    ConfigInvalidInterval,
    ConfigInvalidQueueSize,
    ConfigInvalidBatchSize,
    ConfigInvalidBackoff,
    ConfigInvalidTimeout,

    // Network errors
    NetworkError,

    // HTTP errors
    HttpClientError,
    HttpUnauthorized,
    HttpRateLimited,
    HttpServerError,
    HttpTimeout,
    HttpNetworkError,
    HttpUnexpectedStatus,

    // Event errors
    EventSerializationFailed,
    EventQueueOverflow,
    EventRetryLimit,

    // Lifecycle errors
    WorkerStopped,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InitAlreadyInitialized => "INIT_ALREADY_INITIALIZED",
            ErrorCode::InitNoRuntime => "INIT_NO_RUNTIME",
            ErrorCode::ConfigMissingApiKey => "CONFIG_MISSING_API_KEY",
            ErrorCode::ConfigInvalidUrl => "CONFIG_INVALID_URL",
            ErrorCode::ConfigInvalidInterval => "CONFIG_INVALID_INTERVAL",
            ErrorCode::ConfigInvalidQueueSize => "CONFIG_INVALID_QUEUE_SIZE",
            ErrorCode::ConfigInvalidBatchSize => "CONFIG_INVALID_BATCH_SIZE",
            ErrorCode::ConfigInvalidBackoff => "CONFIG_INVALID_BACKOFF",
            ErrorCode::ConfigInvalidTimeout => "CONFIG_INVALID_TIMEOUT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::HttpClientError => "HTTP_CLIENT_ERROR",
            ErrorCode::HttpUnauthorized => "HTTP_UNAUTHORIZED",
            ErrorCode::HttpRateLimited => "HTTP_RATE_LIMITED",
            ErrorCode::HttpServerError => "HTTP_SERVER_ERROR",
            ErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            ErrorCode::HttpNetworkError => "HTTP_NETWORK_ERROR",
            ErrorCode::HttpUnexpectedStatus => "HTTP_UNEXPECTED_STATUS",
            ErrorCode::EventSerializationFailed => "EVENT_SERIALIZATION_FAILED",
            ErrorCode::EventQueueOverflow => "EVENT_QUEUE_OVERFLOW",
            ErrorCode::EventRetryLimit => "EVENT_RETRY_LIMIT",
            ErrorCode::WorkerStopped => "WORKER_STOPPED",
        }
    }

    /// Whether a failed delivery with this code may succeed on a later attempt.
    ///
    /// Every delivery failure is retried under the retry ceiling; this only
    /// picks the log level of the failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::HttpRateLimited
                | ErrorCode::HttpServerError
                | ErrorCode::HttpTimeout
                | ErrorCode::HttpNetworkError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct TrackerError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TrackerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn delivery_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn already_initialized() -> Self {
        Self::new(
            ErrorCode::InitAlreadyInitialized,
            "Tracker already initialized. Call teardown() before init() again.",
        )
    }

    pub fn worker_stopped() -> Self {
        Self::new(ErrorCode::WorkerStopped, "Delivery worker is not running")
    }

    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InitAlreadyInitialized
                | ErrorCode::ConfigMissingApiKey
                | ErrorCode::ConfigInvalidUrl
                | ErrorCode::ConfigInvalidInterval
                | ErrorCode::ConfigInvalidQueueSize
                | ErrorCode::ConfigInvalidBatchSize
                | ErrorCode::ConfigInvalidBackoff
                | ErrorCode::ConfigInvalidTimeout
        )
    }

    pub fn is_delivery_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NetworkError
                | ErrorCode::HttpClientError
                | ErrorCode::HttpUnauthorized
                | ErrorCode::HttpRateLimited
                | ErrorCode::HttpServerError
                | ErrorCode::HttpTimeout
                | ErrorCode::HttpNetworkError
                | ErrorCode::HttpUnexpectedStatus
                | ErrorCode::EventSerializationFailed
        )
    }

    /// Codes carried by dropped-event notifications.
    pub fn is_event_drop(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::EventQueueOverflow | ErrorCode::EventRetryLimit
        )
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let error = TrackerError::new(ErrorCode::ConfigMissingApiKey, "API key is required");
        assert_eq!(
            error.to_string(),
            "[CONFIG_MISSING_API_KEY] API key is required"
        );
    }

    #[test]
    fn test_categories() {
        assert!(TrackerError::already_initialized().is_config_error());
        assert!(TrackerError::new(ErrorCode::HttpServerError, "x").is_delivery_error());
        assert!(TrackerError::new(ErrorCode::EventRetryLimit, "x").is_event_drop());
        assert!(!TrackerError::worker_stopped().is_config_error());
    }

    #[test]
    fn test_recoverable_codes() {
        assert!(ErrorCode::HttpServerError.is_recoverable());
        assert!(ErrorCode::HttpTimeout.is_recoverable());
        assert!(!ErrorCode::HttpUnauthorized.is_recoverable());
        assert!(!ErrorCode::ConfigMissingApiKey.is_recoverable());
    }
}
