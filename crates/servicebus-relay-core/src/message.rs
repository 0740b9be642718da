//! Message types for relay operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Text rendered when a receive finds the queue empty
pub const NO_MESSAGES_IN_QUEUE: &str = "<no messages in queue>";

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name following the broker's entity naming rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        // Validate length
        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        // Validate characters (ASCII alphanumeric and the separators . - _ /)
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, '.', '-', '_' and '/' allowed".to_string(),
            });
        }

        // Must start and end with a letter or digit, no empty path segments
        let starts_ok = name.starts_with(|c: char| c.is_ascii_alphanumeric());
        let ends_ok = name.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !starts_ok || !ends_ok || name.contains("//") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "must start and end with a letter or digit".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

/// Broker-assigned, monotonically increasing message number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A payload about to be sent to a queue
///
/// Carries no metadata beyond the body. Construction rejects an empty body,
/// so holding an `OutboundMessage` means the local precondition of a send
/// has already been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    body: Bytes,
}

impl OutboundMessage {
    /// Create new outbound message, rejecting empty payloads
    pub fn new(body: impl Into<Bytes>) -> Result<Self, ValidationError> {
        let body = body.into();
        if body.is_empty() {
            return Err(ValidationError::Required {
                field: "payload".to_string(),
            });
        }

        Ok(Self { body })
    }

    /// Create outbound message carrying UTF-8 text
    pub fn from_text(text: &str) -> Result<Self, ValidationError> {
        Self::new(Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Raw message as delivered by a transport, before text decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokeredMessage {
    pub sequence_number: SequenceNumber,
    pub body: Bytes,
    pub enqueued_at: Option<Timestamp>,
}

impl BrokeredMessage {
    pub fn new(sequence_number: SequenceNumber, body: Bytes) -> Self {
        Self {
            sequence_number,
            body,
            enqueued_at: None,
        }
    }

    /// Attach the broker's enqueue time
    pub fn with_enqueued_at(mut self, enqueued_at: Timestamp) -> Self {
        self.enqueued_at = Some(enqueued_at);
        self
    }
}

/// A received message with its payload decoded as text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sequence_number: SequenceNumber,
    pub payload: String,
    pub enqueued_at: Option<Timestamp>,
}

impl InboundMessage {
    /// Render the message the way the front end displays it
    pub fn render(&self) -> String {
        format!("Seq#:{} data:{}", self.sequence_number, self.payload)
    }
}

/// Render the result of a receive, using the sentinel text for an empty queue
pub fn render_receive_outcome(outcome: Option<&InboundMessage>) -> String {
    match outcome {
        Some(message) => message.render(),
        None => NO_MESSAGES_IN_QUEUE.to_string(),
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
