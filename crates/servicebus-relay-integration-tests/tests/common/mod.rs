//! Common test utilities for the relay integration tests
//!
//! This module provides:
//! - Router builders over the in-memory broker and over an HTTPS endpoint
//! - A session factory that records every session it hands out
//! - Request and response helpers

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use servicebus_relay_api::{create_router, AppState, DefaultHealthChecker, ServiceConfig};
use servicebus_relay_core::{
    BrokerEndpoint, BrokerSession, CredentialProvider, InMemoryBroker, MessageRelay, RelayConfig,
    RelayError, SessionFactory, StandardSessionFactory, StaticTokenCredential, TransportKind,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const QUEUE: &str = "orders";

/// Relay configuration for `QUEUE` with a short receive timeout
pub fn relay_config(endpoint: BrokerEndpoint, transport: TransportKind) -> RelayConfig {
    RelayConfig::new(
        endpoint,
        QUEUE.parse().unwrap(),
        Arc::new(StaticTokenCredential::new("integration-token")),
        transport,
    )
    .with_receive_timeout(chrono::Duration::milliseconds(100))
}

/// Build the application router around an arbitrary session factory
pub fn router(config: RelayConfig, factory: Arc<dyn SessionFactory>) -> Router {
    let relay = Arc::new(MessageRelay::new(config, factory));
    let health_checker = Arc::new(DefaultHealthChecker::new(Arc::clone(&relay)));
    create_router(AppState::new(ServiceConfig::default(), relay, health_checker))
}

/// Router backed by `broker`
pub fn in_memory_router(broker: &InMemoryBroker) -> Router {
    let factory = StandardSessionFactory::new().with_in_memory_broker(broker.clone());
    router(
        relay_config(BrokerEndpoint::in_memory(), TransportKind::InMemory),
        Arc::new(factory),
    )
}

/// Router talking HTTPS REST to `base_url` (a mock broker)
#[allow(dead_code)]
pub fn https_router(base_url: &str) -> Router {
    let endpoint = BrokerEndpoint::parse(&format!("{}/", base_url)).unwrap();
    router(
        relay_config(endpoint, TransportKind::Https),
        Arc::new(StandardSessionFactory::new()),
    )
}

/// Session factory that counts sessions and delegates to another factory
#[allow(dead_code)]
pub struct CountingFactory {
    inner: StandardSessionFactory,
    created: AtomicU64,
}

#[allow(dead_code)]
impl CountingFactory {
    pub fn new(inner: StandardSessionFactory) -> Self {
        Self {
            inner,
            created: AtomicU64::new(0),
        }
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for CountingFactory {
    async fn create_session(
        &self,
        endpoint: &BrokerEndpoint,
        credential: &dyn CredentialProvider,
        transport: TransportKind,
    ) -> Result<Box<dyn BrokerSession>, RelayError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.inner
            .create_session(endpoint, credential, transport)
            .await
    }
}

pub fn send_request(message: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/send")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("message_to_send={}", message)))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}
