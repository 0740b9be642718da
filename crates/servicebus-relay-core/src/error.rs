//! Error types for relay operations.

use crate::message::SequenceNumber;
use std::str::Utf8Error;
use thiserror::Error;

/// Error type for every session and relay operation
///
/// The variants follow the lifecycle of a relay call: local validation,
/// session creation (authentication and connection), the single broker
/// operation (send or receive), payload decoding and resource release.
/// An empty queue is not an error; it is reported as `Ok(None)` by
/// [`crate::relay::QueueRelay::try_receive`].
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Send to queue '{queue_name}' failed: {message}")]
    Send { queue_name: String, message: String },

    #[error("Receive from queue '{queue_name}' failed: {message}")]
    Receive { queue_name: String, message: String },

    #[error("Message {sequence_number} is not valid UTF-8 text: {source}")]
    Decode {
        sequence_number: SequenceNumber,
        #[source]
        source: Utf8Error,
    },

    #[error("Failed to release {resource}: {message}")]
    Release { resource: String, message: String },
}

impl RelayError {
    /// Check if error is transient, i.e. the same call may succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Configuration(_) => false,
            Self::Authentication { .. } => false,
            Self::Connection { .. } => true,
            Self::Send { .. } => true,
            Self::Receive { .. } => true,
            Self::Decode { .. } => false,
            Self::Release { .. } => true,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Transport '{transport}' is not available: {message}")]
    TransportUnavailable { transport: String, message: String },
}

/// Validation errors for caller-supplied input
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
