//! Relay configuration: broker endpoint, transport selection and settings.
//!
//! Settings are supplied explicitly by the caller. [`RelaySettings`] is the
//! serde shape read from configuration files and environment variables;
//! [`RelayConfig`] is the runtime form holding a live credential provider.

use crate::credential::{AzureIdentityCredential, CredentialProvider, StaticTokenCredential};
use crate::error::{ConfigurationError, RelayError};
use crate::message::QueueName;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Default bound for a single receive, matching a poll-don't-block usage
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 1_000;

/// Upper bound accepted for a single receive
pub const MAX_RECEIVE_TIMEOUT_MS: u64 = 60_000;

/// Time a transport may take beyond the receive timeout before the relay
/// gives up on the receive
pub const RECEIVE_GRACE_MS: u64 = 2_000;

/// Default HTTP request timeout for broker calls
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Largest message body accepted by a standard tier namespace
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024;

const SERVICE_BUS_HOST_SUFFIX: &str = "servicebus.windows.net";
const IN_MEMORY_ENDPOINT: &str = "sb://localhost/";

// ============================================================================
// Broker Endpoint
// ============================================================================

/// Network address of the broker namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    url: Url,
}

impl BrokerEndpoint {
    /// Derive the endpoint `sb://{namespace}.servicebus.windows.net/`
    pub fn from_namespace(namespace: &str) -> Result<Self, ConfigurationError> {
        let valid = !namespace.is_empty()
            && namespace.len() <= 50
            && namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && namespace.starts_with(|c: char| c.is_ascii_alphabetic())
            && !namespace.ends_with('-');
        if !valid {
            return Err(ConfigurationError::Invalid {
                message: format!("'{}' is not a valid Service Bus namespace", namespace),
            });
        }

        Self::parse(&format!("sb://{}.{}/", namespace, SERVICE_BUS_HOST_SUFFIX))
    }

    /// Parse an explicit endpoint URL (`sb://`, `https://` or `http://`)
    pub fn parse(endpoint: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("Invalid broker endpoint '{}': {}", endpoint, e),
        })?;

        if !matches!(url.scheme(), "sb" | "https" | "http") {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "Unsupported broker endpoint scheme '{}' (expected sb, https or http)",
                    url.scheme()
                ),
            });
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigurationError::Invalid {
                message: format!("Broker endpoint '{}' has no host", endpoint),
            });
        }

        // Queue paths are joined onto the endpoint, which keeps the last
        // segment only when it ends in a slash
        let mut url = url;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self { url })
    }

    /// Placeholder address used with the in-memory transport
    pub fn in_memory() -> Self {
        Self {
            url: Url::parse(IN_MEMORY_ENDPOINT).expect("static endpoint URL is valid"),
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Base URL for the broker's REST interface
    ///
    /// `sb://` endpoints map to `https://` on the same host; `http(s)://`
    /// endpoints are used as given, which lets emulators and test servers
    /// stand in for a namespace.
    pub fn rest_base_url(&self) -> Result<Url, ConfigurationError> {
        if self.url.scheme() != "sb" {
            return Ok(self.url.clone());
        }

        let authority = match self.url.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        };
        Url::parse(&format!("https://{}{}", authority, self.url.path())).map_err(|e| {
            ConfigurationError::Invalid {
                message: format!("Cannot derive REST address from '{}': {}", self.url, e),
            }
        })
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

// ============================================================================
// Transport and decoding
// ============================================================================

/// Wire protocol used to reach the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Broker REST protocol over HTTPS
    #[default]
    Https,
    /// Process-local broker, for development and tests
    InMemory,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Https => write!(f, "https"),
            Self::InMemory => write!(f, "in_memory"),
        }
    }
}

/// How received payloads are turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Invalid UTF-8 is reported as a decode error
    #[default]
    Strict,
    /// Invalid sequences are replaced with U+FFFD
    Lossy,
}

/// Per-operation limits and policies applied by the queue relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub max_message_size: usize,
    pub decode_policy: DecodePolicy,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            decode_policy: DecodePolicy::Strict,
        }
    }
}

// ============================================================================
// Settings (serde)
// ============================================================================

/// Credential source selection
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialSettings {
    /// Azure identity chain; managed identity when hosted in Azure
    #[default]
    #[serde(alias = "managed_identity")]
    AzureIdentity,
    /// Fixed bearer token
    StaticToken { token: String },
}

impl CredentialSettings {
    /// Build the credential provider described by these settings
    pub fn build(&self) -> Result<Arc<dyn CredentialProvider>, RelayError> {
        match self {
            Self::AzureIdentity => Ok(Arc::new(AzureIdentityCredential::from_environment()?)),
            Self::StaticToken { token } => Ok(Arc::new(StaticTokenCredential::new(token.clone()))),
        }
    }
}

impl fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AzureIdentity => write!(f, "AzureIdentity"),
            Self::StaticToken { .. } => f
                .debug_struct("StaticToken")
                .field("token", &"<REDACTED>")
                .finish(),
        }
    }
}

/// Relay settings as read from configuration sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Namespace name; the endpoint is derived from it
    pub namespace: Option<String>,

    /// Explicit endpoint, overrides `namespace`
    pub endpoint: Option<String>,

    /// Queue every relay operation targets
    pub queue_name: String,

    pub transport: TransportKind,

    pub credential: CredentialSettings,

    /// Bound for a single receive, in milliseconds
    pub receive_timeout_ms: u64,

    /// HTTP request timeout for broker calls, in seconds
    pub request_timeout_seconds: u64,

    /// Largest payload accepted by send, in bytes
    pub max_message_size: usize,

    pub decode_policy: DecodePolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            namespace: None,
            endpoint: None,
            queue_name: String::new(),
            transport: TransportKind::default(),
            credential: CredentialSettings::default(),
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            decode_policy: DecodePolicy::default(),
        }
    }
}

impl RelaySettings {
    /// Resolve the broker endpoint
    pub fn endpoint(&self) -> Result<BrokerEndpoint, ConfigurationError> {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.is_empty()) {
            return BrokerEndpoint::parse(endpoint);
        }

        if let Some(namespace) = self.namespace.as_deref().filter(|n| !n.is_empty()) {
            return BrokerEndpoint::from_namespace(namespace);
        }

        match self.transport {
            TransportKind::InMemory => Ok(BrokerEndpoint::in_memory()),
            TransportKind::Https => Err(ConfigurationError::Missing {
                key: "relay.namespace".to_string(),
            }),
        }
    }

    /// Resolve and validate the queue name
    pub fn queue_name(&self) -> Result<QueueName, ConfigurationError> {
        if self.queue_name.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "relay.queue_name".to_string(),
            });
        }

        QueueName::new(self.queue_name.clone()).map_err(|e| ConfigurationError::Invalid {
            message: e.to_string(),
        })
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::milliseconds(self.receive_timeout_ms as i64)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn options(&self) -> RelayOptions {
        RelayOptions {
            max_message_size: self.max_message_size,
            decode_policy: self.decode_policy,
        }
    }

    /// Validate settings without touching the network
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.endpoint()?;
        self.queue_name()?;

        if self.receive_timeout_ms > MAX_RECEIVE_TIMEOUT_MS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "relay.receive_timeout_ms must be at most {} (got {})",
                    MAX_RECEIVE_TIMEOUT_MS, self.receive_timeout_ms
                ),
            });
        }

        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "relay.request_timeout_seconds must be greater than zero".to_string(),
            });
        }

        if self.max_message_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "relay.max_message_size must be greater than zero".to_string(),
            });
        }

        if let CredentialSettings::StaticToken { token } = &self.credential {
            if token.is_empty() {
                return Err(ConfigurationError::Missing {
                    key: "relay.credential.token".to_string(),
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Runtime configuration
// ============================================================================

/// Everything a relay call needs: where, which queue, who, and how
#[derive(Clone)]
pub struct RelayConfig {
    pub endpoint: BrokerEndpoint,
    pub queue_name: QueueName,
    pub credential: Arc<dyn CredentialProvider>,
    pub transport: TransportKind,
    pub receive_timeout: Duration,
    pub options: RelayOptions,
}

impl RelayConfig {
    pub fn new(
        endpoint: BrokerEndpoint,
        queue_name: QueueName,
        credential: Arc<dyn CredentialProvider>,
        transport: TransportKind,
    ) -> Self {
        Self {
            endpoint,
            queue_name,
            credential,
            transport,
            receive_timeout: Duration::milliseconds(DEFAULT_RECEIVE_TIMEOUT_MS as i64),
            options: RelayOptions::default(),
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    /// Build runtime configuration from validated settings
    pub fn from_settings(settings: &RelaySettings) -> Result<Self, RelayError> {
        settings.validate()?;

        let credential = settings.credential.build()?;
        Ok(Self::new(
            settings.endpoint()?,
            settings.queue_name()?,
            credential,
            settings.transport,
        )
        .with_receive_timeout(settings.receive_timeout())
        .with_options(settings.options()))
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("endpoint", &self.endpoint)
            .field("queue_name", &self.queue_name)
            .field("credential", &self.credential.kind())
            .field("transport", &self.transport)
            .field("receive_timeout", &self.receive_timeout)
            .field("options", &self.options)
            .finish()
    }
}
