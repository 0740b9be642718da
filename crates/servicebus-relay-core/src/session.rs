//! Broker sessions, queue clients and the session factory.
//!
//! A [`BrokerSession`] is an authenticated connection context to one broker
//! endpoint. A [`QueueClient`] is scoped to one queue and borrows the session
//! that created it, so a session cannot be released while one of its clients
//! is still alive. Both `close` methods consume the handle: a released
//! session or client cannot be used again.

use crate::config::{BrokerEndpoint, TransportKind};
use crate::credential::{CredentialProvider, SERVICE_BUS_SCOPE};
use crate::error::{ConfigurationError, RelayError};
use crate::message::{BrokeredMessage, OutboundMessage, QueueName};
use crate::providers::{HttpsSession, InMemoryBroker};
use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

/// Handle scoped to a single named queue
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Queue this client is bound to
    fn queue_name(&self) -> &QueueName;

    /// Send one message
    async fn send(&self, message: &OutboundMessage) -> Result<(), RelayError>;

    /// Receive at most one message, waiting up to `timeout`
    ///
    /// Returns `Ok(None)` when the wait elapses without a message. A
    /// returned message has been removed from the queue.
    async fn receive(&self, timeout: Duration) -> Result<Option<BrokeredMessage>, RelayError>;

    /// Release the client
    async fn close(self: Box<Self>) -> Result<(), RelayError>;
}

/// Authenticated connection context to a broker
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Endpoint this session is connected to
    fn endpoint(&self) -> &BrokerEndpoint;

    /// Transport the session runs over
    fn transport(&self) -> TransportKind;

    /// Create a client for `queue`, borrowing this session
    async fn create_queue_client<'a>(
        &'a self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueClient + 'a>, RelayError>;

    /// Release the session
    async fn close(self: Box<Self>) -> Result<(), RelayError>;
}

/// Builds authenticated sessions; every call yields a fresh session
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(
        &self,
        endpoint: &BrokerEndpoint,
        credential: &dyn CredentialProvider,
        transport: TransportKind,
    ) -> Result<Box<dyn BrokerSession>, RelayError>;
}

/// Session factory for the transports shipped with this crate
///
/// The factory holds configuration only. The in-memory transport is
/// available when a broker has been attached with
/// [`StandardSessionFactory::with_in_memory_broker`].
#[derive(Debug, Clone)]
pub struct StandardSessionFactory {
    request_timeout: std::time::Duration,
    in_memory: Option<InMemoryBroker>,
}

impl StandardSessionFactory {
    pub fn new() -> Self {
        Self {
            request_timeout: std::time::Duration::from_secs(
                crate::config::DEFAULT_REQUEST_TIMEOUT_SECONDS,
            ),
            in_memory: None,
        }
    }

    /// Timeout applied to every broker HTTP request
    pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Serve [`TransportKind::InMemory`] sessions from `broker`
    pub fn with_in_memory_broker(mut self, broker: InMemoryBroker) -> Self {
        self.in_memory = Some(broker);
        self
    }
}

impl Default for StandardSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFactory for StandardSessionFactory {
    #[instrument(skip(self, credential), fields(
        endpoint = %endpoint,
        transport = %transport,
        credential = credential.kind(),
    ))]
    async fn create_session(
        &self,
        endpoint: &BrokerEndpoint,
        credential: &dyn CredentialProvider,
        transport: TransportKind,
    ) -> Result<Box<dyn BrokerSession>, RelayError> {
        let token = match credential.get_token(&[SERVICE_BUS_SCOPE]).await {
            Ok(token) => token,
            Err(RelayError::Authentication { message }) => {
                warn!(error = %message, "Credential could not produce a broker token");
                return Err(RelayError::Authentication { message });
            }
            Err(other) => {
                warn!(error = %other, "Credential could not produce a broker token");
                return Err(RelayError::Authentication {
                    message: other.to_string(),
                });
            }
        };

        if token.is_expired() {
            return Err(RelayError::Authentication {
                message: "credential returned an expired token".to_string(),
            });
        }

        debug!("Acquired broker token");

        let session: Box<dyn BrokerSession> = match transport {
            TransportKind::Https => Box::new(HttpsSession::connect(
                endpoint.clone(),
                token,
                self.request_timeout,
            )?),
            TransportKind::InMemory => {
                let broker = self.in_memory.as_ref().ok_or_else(|| {
                    RelayError::Configuration(ConfigurationError::TransportUnavailable {
                        transport: transport.to_string(),
                        message: "no in-memory broker attached to the session factory"
                            .to_string(),
                    })
                })?;
                Box::new(broker.open_session(endpoint.clone(), &token)?)
            }
        };

        info!("Broker session created");
        Ok(session)
    }
}
