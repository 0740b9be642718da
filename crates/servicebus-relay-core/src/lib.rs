//! # Service Bus Relay
//!
//! Queue-backed message relay for Azure Service Bus.
//!
//! This library provides:
//! - Sending a text or binary payload to a named queue
//! - Receiving at most one message with a bounded wait
//! - Per-call session and queue client lifecycle with guaranteed release
//! - An HTTPS REST transport and an in-memory transport for development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for relay operations
//! - [`message`] - Queue names, payloads and received messages
//! - [`config`] - Endpoint, settings and runtime configuration
//! - [`credential`] - Token providers used to authenticate sessions
//! - [`session`] - Session, queue client and session factory traits
//! - [`providers`] - Transport implementations
//! - [`relay`] - Send and receive operations

pub mod config;
pub mod credential;
pub mod error;
pub mod message;
pub mod providers;
pub mod relay;
pub mod session;

pub use config::{
    BrokerEndpoint, CredentialSettings, DecodePolicy, RelayConfig, RelayOptions, RelaySettings,
    TransportKind,
};
pub use credential::{
    AccessToken, AzureIdentityCredential, CredentialProvider, StaticTokenCredential,
    SERVICE_BUS_SCOPE,
};
pub use error::{ConfigurationError, RelayError, ValidationError};
pub use message::{
    render_receive_outcome, BrokeredMessage, InboundMessage, OutboundMessage, QueueName,
    SequenceNumber, Timestamp, NO_MESSAGES_IN_QUEUE,
};
pub use providers::{BrokerStats, InMemoryBroker, InMemoryBrokerConfig};
pub use relay::{MessageRelay, QueueRelay};
pub use session::{BrokerSession, QueueClient, SessionFactory, StandardSessionFactory};
