use thiserror::Error;

use crate::config::ValidationError;

/// Result type alias for relay operations
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Errors that can occur while relaying storefront queries
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Upstream request failed: {0}")]
    UpstreamRequestFailed(String),

    #[error("Upstream returned invalid JSON: {0}")]
    InvalidUpstreamPayload(#[from] serde_json::Error),

    #[error("Telemetry store rejected record with status {0}")]
    TelemetryRejected(http::StatusCode),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
