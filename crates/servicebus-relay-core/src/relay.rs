//! Queue relay operations and the per-call relay flow.
//!
//! [`QueueRelay`] performs exactly one broker operation against a session it
//! is handed: it creates one queue client, uses it once and releases it on
//! every exit path. [`MessageRelay`] wraps that with the session lifecycle:
//! each call creates its own session through a [`SessionFactory`], runs one
//! relay operation and releases the session before returning.
//!
//! Release failures are logged and never replace the result of the
//! operation itself.

use crate::config::{
    DecodePolicy, RelayConfig, RelayOptions, MAX_RECEIVE_TIMEOUT_MS, RECEIVE_GRACE_MS,
};
use crate::error::{RelayError, ValidationError};
use crate::message::{BrokeredMessage, InboundMessage, OutboundMessage, QueueName};
use crate::session::{BrokerSession, QueueClient, SessionFactory};
use bytes::Bytes;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;

const RECEIVE_GRACE: std::time::Duration = std::time::Duration::from_millis(RECEIVE_GRACE_MS);

// ============================================================================
// QueueRelay
// ============================================================================

/// Send and bounded-wait receive against one named queue
#[derive(Debug, Clone)]
pub struct QueueRelay {
    queue: QueueName,
    options: RelayOptions,
}

impl QueueRelay {
    pub fn new(queue: QueueName) -> Self {
        Self {
            queue,
            options: RelayOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn queue_name(&self) -> &QueueName {
        &self.queue
    }

    /// Validate a payload and wrap it for sending
    ///
    /// Fails with a validation error for empty payloads and payloads over the
    /// configured size limit. No broker call is made.
    pub fn prepare(&self, payload: impl Into<Bytes>) -> Result<OutboundMessage, RelayError> {
        let message = OutboundMessage::new(payload)?;
        self.check_size(&message)?;
        Ok(message)
    }

    fn check_size(&self, message: &OutboundMessage) -> Result<(), RelayError> {
        if message.len() > self.options.max_message_size {
            return Err(ValidationError::OutOfRange {
                field: "payload".to_string(),
                message: format!(
                    "{} bytes exceeds the maximum of {} bytes",
                    message.len(),
                    self.options.max_message_size
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Send `payload` to the queue through `session`
    pub async fn send(
        &self,
        session: &dyn BrokerSession,
        payload: impl Into<Bytes>,
    ) -> Result<(), RelayError> {
        let message = self.prepare(payload)?;
        self.send_message(session, &message).await
    }

    /// Send an already prepared message to the queue through `session`
    #[instrument(skip_all, fields(queue = %self.queue, size = message.len()))]
    pub async fn send_message(
        &self,
        session: &dyn BrokerSession,
        message: &OutboundMessage,
    ) -> Result<(), RelayError> {
        self.check_size(message)?;

        let client = session.create_queue_client(&self.queue).await?;
        debug!("Queue client acquired");

        let outcome = client.send(message).await;
        release_client(client).await;

        match &outcome {
            Ok(()) => info!("Message sent"),
            Err(e) => warn!(error = %e, "Send failed"),
        }
        outcome
    }

    /// Receive at most one message, waiting no longer than `timeout`
    ///
    /// `Ok(None)` means the transport reported that the wait elapsed without a
    /// message. A received message has been removed from the queue by the
    /// broker. A transport that has not answered `RECEIVE_GRACE_MS` after the
    /// timeout is a receive error, since it may already have taken a message.
    #[instrument(skip_all, fields(queue = %self.queue, timeout_ms = timeout.num_milliseconds()))]
    pub async fn try_receive(
        &self,
        session: &dyn BrokerSession,
        timeout: Duration,
    ) -> Result<Option<InboundMessage>, RelayError> {
        let wait = validate_receive_timeout(timeout)?;

        let client = session.create_queue_client(&self.queue).await?;
        debug!("Queue client acquired");

        let outcome = match tokio::time::timeout(wait + RECEIVE_GRACE, client.receive(timeout)).await
        {
            Ok(result) => result,
            Err(_) => Err(RelayError::Receive {
                queue_name: self.queue.to_string(),
                message: "transport did not return within the receive deadline".to_string(),
            }),
        };
        release_client(client).await;

        match outcome {
            Ok(Some(message)) => {
                let inbound = self.decode(message)?;
                info!(sequence_number = %inbound.sequence_number, "Message received");
                Ok(Some(inbound))
            }
            Ok(None) => {
                debug!("No message in queue");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Receive failed");
                Err(e)
            }
        }
    }

    fn decode(&self, message: BrokeredMessage) -> Result<InboundMessage, RelayError> {
        let payload = match self.options.decode_policy {
            DecodePolicy::Strict => std::str::from_utf8(&message.body)
                .map_err(|source| RelayError::Decode {
                    sequence_number: message.sequence_number,
                    source,
                })?
                .to_string(),
            DecodePolicy::Lossy => String::from_utf8_lossy(&message.body).into_owned(),
        };

        Ok(InboundMessage {
            sequence_number: message.sequence_number,
            payload,
            enqueued_at: message.enqueued_at,
        })
    }
}

/// Check a receive timeout is within `0..=MAX_RECEIVE_TIMEOUT_MS`
pub fn validate_receive_timeout(timeout: Duration) -> Result<std::time::Duration, RelayError> {
    let millis = timeout.num_milliseconds();
    if millis < 0 || millis as u64 > MAX_RECEIVE_TIMEOUT_MS {
        return Err(ValidationError::OutOfRange {
            field: "timeout".to_string(),
            message: format!(
                "must be between 0 and {} ms (got {} ms)",
                MAX_RECEIVE_TIMEOUT_MS, millis
            ),
        }
        .into());
    }

    Ok(std::time::Duration::from_millis(millis as u64))
}

async fn release_client(client: Box<dyn QueueClient + '_>) {
    let queue = client.queue_name().clone();
    match client.close().await {
        Ok(()) => debug!(queue = %queue, "Queue client released"),
        Err(e) => warn!(queue = %queue, error = %e, "Failed to release queue client"),
    }
}

async fn release_session(session: Box<dyn BrokerSession>) {
    let endpoint = session.endpoint().to_string();
    match session.close().await {
        Ok(()) => debug!(endpoint = %endpoint, "Session released"),
        Err(e) => warn!(endpoint = %endpoint, error = %e, "Failed to release session"),
    }
}

// ============================================================================
// MessageRelay
// ============================================================================

/// Configured relay that owns the whole lifecycle of each call
///
/// Every call validates its input locally, creates a fresh session, performs
/// one queue relay operation and releases the session. Nothing is shared or
/// retained between calls, so concurrent calls never contend inside the
/// relay.
#[derive(Clone)]
pub struct MessageRelay {
    config: RelayConfig,
    factory: Arc<dyn SessionFactory>,
    relay: QueueRelay,
}

impl MessageRelay {
    pub fn new(config: RelayConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let relay = QueueRelay::new(config.queue_name.clone()).with_options(config.options);
        Self {
            config,
            factory,
            relay,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Send `payload` to the configured queue
    #[instrument(skip_all, fields(queue = %self.config.queue_name))]
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), RelayError> {
        let message = self.relay.prepare(payload)?;

        let session = self.open_session().await?;
        let outcome = self.relay.send_message(session.as_ref(), &message).await;
        release_session(session).await;
        outcome
    }

    /// Send UTF-8 text to the configured queue
    pub async fn send_text(&self, text: &str) -> Result<(), RelayError> {
        self.send(Bytes::copy_from_slice(text.as_bytes())).await
    }

    /// Receive the next message using the configured timeout
    pub async fn try_receive(&self) -> Result<Option<InboundMessage>, RelayError> {
        self.try_receive_within(self.config.receive_timeout).await
    }

    /// Receive the next message, waiting no longer than `timeout`
    #[instrument(skip_all, fields(queue = %self.config.queue_name))]
    pub async fn try_receive_within(
        &self,
        timeout: Duration,
    ) -> Result<Option<InboundMessage>, RelayError> {
        validate_receive_timeout(timeout)?;

        let session = self.open_session().await?;
        let outcome = self.relay.try_receive(session.as_ref(), timeout).await;
        release_session(session).await;
        outcome
    }

    async fn open_session(&self) -> Result<Box<dyn BrokerSession>, RelayError> {
        self.factory
            .create_session(
                &self.config.endpoint,
                self.config.credential.as_ref(),
                self.config.transport,
            )
            .await
    }
}

impl std::fmt::Debug for MessageRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRelay")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
