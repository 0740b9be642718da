//! Tests for the HTTP routes backed by the in-memory broker.

use super::*;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use servicebus_relay_core::{
    BrokerEndpoint, BrokerSession, CredentialProvider, InMemoryBroker, RelayConfig, RelayError,
    SessionFactory, StandardSessionFactory, StaticTokenCredential, TransportKind,
};
use tower::ServiceExt;

// ============================================================================
// Test helpers
// ============================================================================

/// Session factory whose broker is always unreachable
struct UnreachableFactory;

#[async_trait]
impl SessionFactory for UnreachableFactory {
    async fn create_session(
        &self,
        endpoint: &BrokerEndpoint,
        _credential: &dyn CredentialProvider,
        _transport: TransportKind,
    ) -> Result<Box<dyn BrokerSession>, RelayError> {
        Err(RelayError::Connection {
            endpoint: endpoint.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

fn relay_config() -> RelayConfig {
    RelayConfig::new(
        BrokerEndpoint::in_memory(),
        "orders".parse().unwrap(),
        Arc::new(StaticTokenCredential::new("token")),
        TransportKind::InMemory,
    )
    .with_receive_timeout(chrono::Duration::milliseconds(50))
}

fn app_with_factory(factory: Arc<dyn SessionFactory>) -> Router {
    let relay = Arc::new(MessageRelay::new(relay_config(), factory));
    let health_checker = Arc::new(DefaultHealthChecker::new(Arc::clone(&relay)));
    create_router(AppState::new(
        ServiceConfig::default(),
        relay,
        health_checker,
    ))
}

fn app_with_broker(broker: &InMemoryBroker) -> Router {
    app_with_factory(Arc::new(
        StandardSessionFactory::new().with_in_memory_broker(broker.clone()),
    ))
}

fn send_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/send")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

// ============================================================================
// Relay routes
// ============================================================================

#[tokio::test]
async fn test_index_page_contains_send_form() {
    let broker = InMemoryBroker::default();
    let app = app_with_broker(&broker);

    let response = app.oneshot(get_request("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("name=\"message_to_send\""));
    assert!(body.contains("Queue: orders"));
    assert_eq!(broker.stats().total_calls(), 0);
}

#[tokio::test]
async fn test_index_page_shows_empty_message_notice() {
    let app = app_with_broker(&InMemoryBroker::default());

    let response = app.oneshot(get_request("/?error=empty")).await.unwrap();

    let body = body_text(response).await;
    assert!(body.contains("Enter a message before sending."));
}

#[tokio::test]
async fn test_send_redirects_to_index() {
    let broker = InMemoryBroker::default();
    let app = app_with_broker(&broker);

    let response = app
        .oneshot(send_request("message_to_send=hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert_eq!(broker.queue_depth(&"orders".parse().unwrap()), 1);
    assert_eq!(broker.stats().open_sessions(), 0);
}

#[tokio::test]
async fn test_empty_send_redirects_without_broker_calls() {
    let broker = InMemoryBroker::default();
    let app = app_with_broker(&broker);

    let response = app.oneshot(send_request("message_to_send=")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?error=empty");
    assert_eq!(broker.stats().total_calls(), 0);
}

#[tokio::test]
async fn test_missing_field_is_treated_as_empty() {
    let broker = InMemoryBroker::default();
    let app = app_with_broker(&broker);

    let response = app.oneshot(send_request("")).await.unwrap();

    assert_eq!(location(&response), "/?error=empty");
    assert_eq!(broker.stats().total_calls(), 0);
}

#[tokio::test]
async fn test_receive_renders_message() {
    let broker = InMemoryBroker::default();
    let app = app_with_broker(&broker);

    let sent = app
        .clone()
        .oneshot(send_request("message_to_send=hello"))
        .await
        .unwrap();
    assert_eq!(sent.status(), StatusCode::SEE_OTHER);

    let response = app.oneshot(get_request("/receive")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Seq#:1 data:hello"), "body: {}", body);
}

#[tokio::test]
async fn test_receive_on_empty_queue_renders_sentinel() {
    let broker = InMemoryBroker::default();
    let app = app_with_broker(&broker);

    let response = app.oneshot(get_request("/receive")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("&lt;no messages in queue&gt;"), "body: {}", body);
    assert_eq!(broker.stats().open_sessions(), 0);
}

#[tokio::test]
async fn test_received_payload_is_html_escaped() {
    let broker = InMemoryBroker::default();
    broker.enqueue_raw(&"orders".parse().unwrap(), "<script>alert(1)</script>");
    let app = app_with_broker(&broker);

    let response = app.oneshot(get_request("/receive")).await.unwrap();

    let body = body_text(response).await;
    assert!(!body.contains("<script>"));
    assert!(body.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn test_unreachable_broker_is_service_unavailable() {
    let app = app_with_factory(Arc::new(UnreachableFactory));

    let response = app
        .oneshot(send_request("message_to_send=hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("Retry-After"));
}

// ============================================================================
// Health and middleware
// ============================================================================

#[tokio::test]
async fn test_health_reports_relay_target() {
    let app = app_with_broker(&InMemoryBroker::default());

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["checks"]["relay"]["message"]
        .as_str()
        .unwrap()
        .contains("orders"));
}

#[tokio::test]
async fn test_readiness() {
    let app = app_with_broker(&InMemoryBroker::default());

    let response = app.oneshot(get_request("/ready")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_correlation_id_is_propagated() {
    let app = app_with_broker(&InMemoryBroker::default());

    let request = Request::builder()
        .uri("/health")
        .header("x-correlation-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get("x-correlation-id").unwrap(),
        "abc-123"
    );
}

#[tokio::test]
async fn test_correlation_id_is_generated_when_missing() {
    let app = app_with_broker(&InMemoryBroker::default());

    let response = app.oneshot(get_request("/health")).await.unwrap();

    let id = response
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}
