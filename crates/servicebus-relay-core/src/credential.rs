//! Credential providers used to authenticate broker sessions.
//!
//! The relay never inspects credentials; it asks a [`CredentialProvider`] for a
//! bearer token scoped to the broker audience whenever a session is created.
//! Two providers ship with the crate:
//!
//! - [`AzureIdentityCredential`]: the Azure identity credential chain
//!   (managed identity when running in Azure, developer credentials locally)
//! - [`StaticTokenCredential`]: a fixed token, for emulators and tests

use crate::error::RelayError;
use crate::message::Timestamp;
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use chrono::{TimeZone, Utc};
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;

/// Token scope for the Service Bus audience
pub const SERVICE_BUS_SCOPE: &str = "https://servicebus.azure.net/.default";

/// Bearer token issued for the broker audience
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<Timestamp>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Raw token value for the `Authorization` header
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<&Timestamp> {
        self.expires_at.as_ref()
    }

    pub fn is_expired(&self) -> bool {
        match &self.expires_at {
            Some(expires_at) => Timestamp::now() >= *expires_at,
            None => false,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<REDACTED>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens for the broker
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Produce a token valid for the given scopes
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, RelayError>;

    /// Short name used in logs
    fn kind(&self) -> &'static str;
}

// ============================================================================
// Azure identity
// ============================================================================

/// Credential backed by the Azure identity SDK
pub struct AzureIdentityCredential {
    inner: Arc<dyn TokenCredential>,
}

impl AzureIdentityCredential {
    /// Build the default credential chain from the process environment
    ///
    /// In Azure App Service and on VMs this resolves to the managed identity
    /// of the host.
    pub fn from_environment() -> Result<Self, RelayError> {
        let inner = azure_identity::create_credential().map_err(|e| {
            RelayError::Authentication {
                message: format!("Failed to create Azure credential: {}", e),
            }
        })?;

        Ok(Self { inner })
    }

    /// Wrap an existing SDK credential
    pub fn with_credential(inner: Arc<dyn TokenCredential>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for AzureIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureIdentityCredential").finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for AzureIdentityCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, RelayError> {
        let token = self
            .inner
            .get_token(scopes)
            .await
            .map_err(|e| RelayError::Authentication {
                message: e.to_string(),
            })?;

        let mut access_token = AccessToken::new(token.token.secret().to_string());
        if let Some(expires_at) = Utc
            .timestamp_opt(token.expires_on.unix_timestamp(), 0)
            .single()
        {
            access_token = access_token.with_expiry(Timestamp::from_datetime(expires_at));
        }

        Ok(access_token)
    }

    fn kind(&self) -> &'static str {
        "azure_identity"
    }
}

// ============================================================================
// Static token
// ============================================================================

/// Credential that always hands out the same token
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

impl fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenCredential")
            .field("token", &self.token)
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenCredential {
    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken, RelayError> {
        if self.token.secret().is_empty() {
            return Err(RelayError::Authentication {
                message: "static token is empty".to_string(),
            });
        }

        Ok(self.token.clone())
    }

    fn kind(&self) -> &'static str {
        "static_token"
    }
}
