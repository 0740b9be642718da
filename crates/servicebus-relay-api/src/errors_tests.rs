//! Tests for HTTP error mapping.

use super::*;
use servicebus_relay_core::{SequenceNumber, ValidationError};

fn decode_error() -> RelayError {
    let bytes = vec![0xff];
    let source = std::str::from_utf8(&bytes).unwrap_err();
    RelayError::Decode {
        sequence_number: SequenceNumber::new(3),
        source,
    }
}

#[test]
fn test_status_codes() {
    let cases = vec![
        (
            RelayError::Validation(ValidationError::Required {
                field: "payload".to_string(),
            }),
            StatusCode::BAD_REQUEST,
        ),
        (
            RelayError::Authentication {
                message: "rejected".to_string(),
            },
            StatusCode::BAD_GATEWAY,
        ),
        (decode_error(), StatusCode::BAD_GATEWAY),
        (
            RelayError::Send {
                queue_name: "orders".to_string(),
                message: "busy".to_string(),
            },
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            RelayError::Receive {
                queue_name: "orders".to_string(),
                message: "detached".to_string(),
            },
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            RelayError::Configuration(ConfigurationError::Missing {
                key: "relay.queue_name".to_string(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (error, expected) in cases {
        let description = error.to_string();
        assert_eq!(
            RelayHandlerError::from(error).status_code(),
            expected,
            "{}",
            description
        );
    }
}

#[test]
fn test_transient_error_sets_retry_after() {
    let error = RelayHandlerError::from(RelayError::Connection {
        endpoint: "sb://contoso.servicebus.windows.net/".to_string(),
        message: "refused".to_string(),
    });

    let response = error.into_response();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get("Retry-After").unwrap(), "5");
}

#[test]
fn test_validation_error_has_no_retry_after() {
    let error = RelayHandlerError::from(RelayError::Validation(ValidationError::Required {
        field: "payload".to_string(),
    }));

    let response = error.into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get("Retry-After").is_none());
}

#[tokio::test]
async fn test_internal_error_body_is_generic() {
    let error = RelayHandlerError::Relay(RelayError::Configuration(ConfigurationError::Invalid {
        message: "token cache corrupted".to_string(),
    }));

    let response = error.into_response();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["status"], 500);
    assert!(!body["error"].as_str().unwrap().contains("token cache"));
}

#[test]
fn test_relay_configuration_error_converts_to_config_error() {
    let error = ConfigError::from(RelayError::Configuration(ConfigurationError::Invalid {
        message: "bad endpoint".to_string(),
    }));

    assert!(matches!(error, ConfigError::Relay(_)));
}
