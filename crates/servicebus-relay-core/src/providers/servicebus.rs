//! Azure Service Bus transport over the broker's HTTPS REST interface.
//!
//! Each operation maps to one HTTP request against the namespace:
//!
//! - **Send**: `POST {base}/{queue}/messages`, answered with `201 Created`
//! - **Receive**: `DELETE {base}/{queue}/messages/head?timeout={seconds}`
//!   (receive-and-delete). `200 OK` carries the message body and a
//!   `BrokerProperties` JSON header with the sequence number; `204 No Content`
//!   means the wait elapsed with no message.
//!
//! Requests are authorized with the bearer token acquired when the session
//! was created. HTTP connections are pooled by the `reqwest` client owned by
//! the session and dropped with it.

use crate::config::{BrokerEndpoint, TransportKind, RECEIVE_GRACE_MS};
use crate::credential::AccessToken;
use crate::error::RelayError;
use crate::message::{BrokeredMessage, OutboundMessage, QueueName, SequenceNumber, Timestamp};
use crate::session::{BrokerSession, QueueClient};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

#[cfg(test)]
#[path = "servicebus_tests.rs"]
mod tests;

const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";
const MESSAGE_CONTENT_TYPE: &str = "application/octet-stream";

/// Broker metadata returned with a received message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties {
    sequence_number: u64,
    #[serde(default)]
    enqueued_time_utc: Option<String>,
}

impl BrokerProperties {
    fn enqueued_at(&self) -> Option<Timestamp> {
        let raw = self.enqueued_time_utc.as_deref()?;
        DateTime::parse_from_rfc2822(raw)
            .ok()
            .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
    }
}

// ============================================================================
// HttpsSession
// ============================================================================

/// Authenticated session against a Service Bus namespace
pub struct HttpsSession {
    endpoint: BrokerEndpoint,
    base_url: Url,
    http_client: HttpClient,
    token: AccessToken,
    request_timeout: std::time::Duration,
}

impl HttpsSession {
    /// Prepare a session for `endpoint` using an already acquired token
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no REST address can be derived from the
    /// endpoint and `Connection` if the HTTP client cannot be initialised.
    pub fn connect(
        endpoint: BrokerEndpoint,
        token: AccessToken,
        request_timeout: std::time::Duration,
    ) -> Result<Self, RelayError> {
        let base_url = endpoint.rest_base_url()?;

        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RelayError::Connection {
                endpoint: endpoint.to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        debug!(endpoint = %endpoint, base_url = %base_url, "HTTPS session ready");

        Ok(Self {
            endpoint,
            base_url,
            http_client,
            token,
            request_timeout,
        })
    }

    fn messages_url(&self, queue: &QueueName) -> Result<Url, RelayError> {
        self.base_url
            .join(&format!("{}/messages", queue.as_str()))
            .map_err(|e| RelayError::Connection {
                endpoint: self.endpoint.to_string(),
                message: format!("Invalid queue address for '{}': {}", queue, e),
            })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.secret())
    }
}

impl fmt::Debug for HttpsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpsSession")
            .field("endpoint", &self.endpoint)
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token)
            .finish()
    }
}

#[async_trait]
impl BrokerSession for HttpsSession {
    fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Https
    }

    async fn create_queue_client<'a>(
        &'a self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueClient + 'a>, RelayError> {
        let messages_url = self.messages_url(queue)?;
        Ok(Box::new(HttpsQueueClient {
            session: self,
            queue: queue.clone(),
            messages_url,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), RelayError> {
        debug!(endpoint = %self.endpoint, "HTTPS session closed");
        Ok(())
    }
}

// ============================================================================
// HttpsQueueClient
// ============================================================================

struct HttpsQueueClient<'a> {
    session: &'a HttpsSession,
    queue: QueueName,
    messages_url: Url,
}

impl HttpsQueueClient<'_> {
    fn head_url(&self, timeout_seconds: i64) -> Result<Url, RelayError> {
        let mut url = Url::parse(&format!("{}/head", self.messages_url)).map_err(|e| {
            RelayError::Receive {
                queue_name: self.queue.to_string(),
                message: format!("Invalid receive address: {}", e),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("timeout", &timeout_seconds.to_string());
        Ok(url)
    }

    /// Classify a non-success response, reading its body for the message
    async fn failure(&self, response: Response, operation: Operation) -> RelayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body.trim())
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RelayError::Authentication {
                message: format!("Broker rejected credentials ({})", detail),
            },
            StatusCode::NOT_FOUND => {
                operation.error(&self.queue, format!("queue not found ({})", detail))
            }
            _ => operation.error(&self.queue, detail),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Send,
    Receive,
}

impl Operation {
    fn error(self, queue: &QueueName, message: String) -> RelayError {
        match self {
            Self::Send => RelayError::Send {
                queue_name: queue.to_string(),
                message,
            },
            Self::Receive => RelayError::Receive {
                queue_name: queue.to_string(),
                message,
            },
        }
    }
}

impl HttpsQueueClient<'_> {
    /// Classify a request that produced no response
    ///
    /// Failing to reach the broker at all is a connection error; anything
    /// after the connection was made belongs to the operation.
    fn transport_error(&self, error: reqwest::Error, operation: Operation) -> RelayError {
        if error.is_connect() {
            return RelayError::Connection {
                endpoint: self.session.endpoint.to_string(),
                message: format!("Connection failed: {}", error),
            };
        }

        let message = if error.is_timeout() {
            format!("Request timeout: {}", error)
        } else {
            format!("HTTP request failed: {}", error)
        };
        operation.error(&self.queue, message)
    }
}

#[async_trait]
impl QueueClient for HttpsQueueClient<'_> {
    fn queue_name(&self) -> &QueueName {
        &self.queue
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), RelayError> {
        let response = self
            .session
            .http_client
            .post(self.messages_url.clone())
            .header(AUTHORIZATION, self.session.bearer())
            .header(CONTENT_TYPE, MESSAGE_CONTENT_TYPE)
            .body(message.body().clone())
            .send()
            .await
            .map_err(|e| self.transport_error(e, Operation::Send))?;

        if response.status().is_success() {
            debug!(
                queue = %self.queue,
                size = message.len(),
                status = %response.status(),
                "Message accepted by broker"
            );
            return Ok(());
        }

        let error = self.failure(response, Operation::Send).await;
        warn!(queue = %self.queue, error = %error, "Broker refused message");
        Err(error)
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<BrokeredMessage>, RelayError> {
        // The broker takes whole seconds; round up so short waits still wait
        let millis = timeout.num_milliseconds().max(0);
        let timeout_seconds = (millis + 999) / 1000;
        let url = self.head_url(timeout_seconds)?;

        // Give up no later than the relay does, so a late answer is never
        // read after the caller has been told the receive failed
        let grace = std::time::Duration::from_millis(RECEIVE_GRACE_MS);
        let wait = std::time::Duration::from_millis(millis as u64);
        let response = self
            .session
            .http_client
            .delete(url)
            .header(AUTHORIZATION, self.session.bearer())
            .timeout(wait + grace.min(self.session.request_timeout))
            .send()
            .await
            .map_err(|e| self.transport_error(e, Operation::Receive))?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!(queue = %self.queue, "No message available before timeout");
                Ok(None)
            }
            status if status.is_success() => {
                let properties = response
                    .headers()
                    .get(BROKER_PROPERTIES_HEADER)
                    .ok_or_else(|| {
                        Operation::Receive.error(
                            &self.queue,
                            "response is missing the BrokerProperties header".to_string(),
                        )
                    })?
                    .to_str()
                    .map_err(|e| {
                        Operation::Receive
                            .error(&self.queue, format!("unreadable BrokerProperties: {}", e))
                    })
                    .and_then(|raw| {
                        serde_json::from_str::<BrokerProperties>(raw).map_err(|e| {
                            Operation::Receive
                                .error(&self.queue, format!("invalid BrokerProperties: {}", e))
                        })
                    })?;

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| self.transport_error(e, Operation::Receive))?;

                let mut message =
                    BrokeredMessage::new(SequenceNumber::new(properties.sequence_number), body);
                if let Some(enqueued_at) = properties.enqueued_at() {
                    message = message.with_enqueued_at(enqueued_at);
                }

                debug!(
                    queue = %self.queue,
                    sequence_number = %message.sequence_number,
                    "Message received"
                );
                Ok(Some(message))
            }
            _ => {
                let error = self.failure(response, Operation::Receive).await;
                warn!(queue = %self.queue, error = %error, "Receive failed");
                Err(error)
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), RelayError> {
        Ok(())
    }
}
