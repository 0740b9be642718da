//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use servicebus_relay_core::{ConfigurationError, RelayError};
use tracing::{error, warn};

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Seconds a client should wait before retrying a transient failure
const RETRY_AFTER_SECONDS: u64 = 5;

/// Relay handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the request itself was invalid (empty or oversized
///   payload). Nothing was sent to the broker.
/// - `502 Bad Gateway`: the broker rejected our credentials, or returned a
///   message whose payload could not be decoded
/// - `503 Service Unavailable`: transient broker failures, with `Retry-After`
/// - `500 Internal Server Error`: configuration problems and anything else
///
/// Client-facing messages never include token material; details are logged
/// server-side.
#[derive(Debug, thiserror::Error)]
pub enum RelayHandlerError {
    #[error("{0}")]
    Relay(#[from] RelayError),
}

impl RelayHandlerError {
    /// Status code this error is reported with
    pub fn status_code(&self) -> StatusCode {
        let Self::Relay(e) = self;
        match e {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Authentication { .. } | RelayError::Decode { .. } => {
                StatusCode::BAD_GATEWAY
            }
            e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, retry_after) = match &self {
            Self::Relay(e) if status == StatusCode::SERVICE_UNAVAILABLE => {
                warn!(error = %e, "Transient broker failure");
                (self.to_string(), Some(RETRY_AFTER_SECONDS))
            }
            Self::Relay(e @ RelayError::Validation(_)) => (e.to_string(), None),
            Self::Relay(e) if status == StatusCode::BAD_GATEWAY => {
                warn!(error = %e, "Broker interaction failed");
                (e.to_string(), None)
            }
            Self::Relay(e) => {
                error!(error = %e, "Relay failed");
                (
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Failed to load configuration: {message}")]
    Load { message: String },

    #[error("Relay configuration error: {0}")]
    Relay(#[from] ConfigurationError),
}

impl From<RelayError> for ConfigError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::Configuration(e) => Self::Relay(e),
            other => Self::Invalid {
                message: other.to_string(),
            },
        }
    }
}
