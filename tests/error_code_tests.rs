use adscouter::{ErrorCode, TrackerError};

#[test]
fn test_error_code_string_values() {
    assert_eq!(ErrorCode::InitAlreadyInitialized.as_str(), "INIT_ALREADY_INITIALIZED");
    assert_eq!(ErrorCode::InitNoRuntime.as_str(), "INIT_NO_RUNTIME");

    assert_eq!(ErrorCode::ConfigMissingApiKey.as_str(), "CONFIG_MISSING_API_KEY");
    assert_eq!(ErrorCode::ConfigInvalidUrl.as_str(), "CONFIG_INVALID_URL");
    assert_eq!(ErrorCode::ConfigInvalidBackoff.as_str(), "CONFIG_INVALID_BACKOFF");

    assert_eq!(ErrorCode::NetworkError.as_str(), "NETWORK_ERROR");
    assert_eq!(ErrorCode::HttpTimeout.as_str(), "HTTP_TIMEOUT");

    assert_eq!(ErrorCode::HttpUnauthorized.as_str(), "HTTP_UNAUTHORIZED");
    assert_eq!(ErrorCode::HttpRateLimited.as_str(), "HTTP_RATE_LIMITED");
    assert_eq!(ErrorCode::HttpServerError.as_str(), "HTTP_SERVER_ERROR");

    assert_eq!(ErrorCode::EventQueueOverflow.as_str(), "EVENT_QUEUE_OVERFLOW");
    assert_eq!(ErrorCode::EventRetryLimit.as_str(), "EVENT_RETRY_LIMIT");
    assert_eq!(ErrorCode::WorkerStopped.as_str(), "WORKER_STOPPED");
}

#[test]
fn test_recoverable_errors() {
    assert!(ErrorCode::NetworkError.is_recoverable());
    assert!(ErrorCode::HttpRateLimited.is_recoverable());
    assert!(ErrorCode::HttpServerError.is_recoverable());
    assert!(ErrorCode::HttpTimeout.is_recoverable());
    assert!(ErrorCode::HttpNetworkError.is_recoverable());
}

#[test]
fn test_non_recoverable_errors() {
    assert!(!ErrorCode::ConfigMissingApiKey.is_recoverable());
    assert!(!ErrorCode::HttpUnauthorized.is_recoverable());
    assert!(!ErrorCode::HttpClientError.is_recoverable());
    assert!(!ErrorCode::InitAlreadyInitialized.is_recoverable());
    assert!(!ErrorCode::WorkerStopped.is_recoverable());
}

#[test]
fn test_error_display() {
    let error = TrackerError::new(ErrorCode::HttpServerError, "Server Error: 503");
    assert_eq!(error.to_string(), "[HTTP_SERVER_ERROR] Server Error: 503");
    assert_eq!(format!("{}", ErrorCode::HttpTimeout), "HTTP_TIMEOUT");
}

#[test]
fn test_error_categories() {
    let config = TrackerError::config_error(ErrorCode::ConfigMissingApiKey, "API key is required");
    assert!(config.is_config_error());
    assert!(!config.is_delivery_error());

    let delivery = TrackerError::delivery_error(ErrorCode::HttpRateLimited, "Too many requests");
    assert!(delivery.is_delivery_error());
    assert!(delivery.is_recoverable());
    assert!(!delivery.is_config_error());

    let drop = TrackerError::new(ErrorCode::EventRetryLimit, "Dropped after 3 retries");
    assert!(drop.is_event_drop());

    assert!(TrackerError::already_initialized().is_config_error());
    assert_eq!(TrackerError::worker_stopped().code, ErrorCode::WorkerStopped);
}

#[test]
fn test_error_with_source() {
    use std::error::Error;

    let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
    let error = TrackerError::with_source(ErrorCode::HttpNetworkError, "Connection failed", io);

    assert!(error.source().is_some());
    assert_eq!(error.code, ErrorCode::HttpNetworkError);
}
