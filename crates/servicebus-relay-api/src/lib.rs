//! # Service Bus Relay HTTP Service
//!
//! HTTP front end for relaying text messages through an Azure Service Bus
//! queue.
//!
//! This service provides:
//! - An index page with a send form and a receive button
//! - `POST /send` relaying the form field `message_to_send` to the queue
//! - `GET /receive` taking at most one message off the queue
//! - Health and readiness endpoints
//!
//! Every send and receive request runs one complete relay call: a session
//! is created for the request and released before the response is written.

pub mod config;
pub mod errors;
pub mod responses;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

pub use config::{LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ConfigError, RelayHandlerError, ServiceError};
pub use responses::{
    HealthCheckResult, HealthResponse, HealthStatus, IndexPage, IndexParams, ReadinessResponse,
    SendForm,
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{Html, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use servicebus_relay_core::{render_receive_outcome, MessageRelay, Timestamp};
use std::{collections::HashMap, future::IntoFuture, net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Relay used by the send and receive handlers
    pub relay: Arc<MessageRelay>,

    /// Health checker for system monitoring
    pub health_checker: Arc<dyn HealthChecker>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        relay: Arc<MessageRelay>,
        health_checker: Arc<dyn HealthChecker>,
    ) -> Self {
        Self {
            config,
            relay,
            health_checker,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let relay_routes = Router::new()
        .route("/", get(handle_index))
        .route("/send", post(handle_send))
        .route("/receive", get(handle_receive));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let mut router = Router::new()
        .merge(relay_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        );

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    relay: Arc<MessageRelay>,
    health_checker: Arc<dyn HealthChecker>,
) -> Result<(), ServiceError> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            ServiceError::Configuration(ConfigError::Invalid {
                message: format!(
                    "Invalid listen address {}:{}: {}",
                    config.server.host, config.server.port, e
                ),
            })
        })?;

    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_seconds);
    let state = AppState::new(config, relay, health_checker);
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.to_string(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", addr);

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    };
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();

    // In-flight requests get `shutdown_timeout` to finish once a signal arrives
    let deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let result = tokio::select! {
        result = server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out; dropping in-flight requests"
            );
            Ok(())
        }
    };

    info!("HTTP server shutdown complete");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============================================================================
// Relay Handlers
// ============================================================================

/// Index page with the send form
async fn handle_index(
    State(state): State<AppState>,
    Query(params): Query<IndexParams>,
) -> Html<String> {
    let page = IndexPage::new(state.relay.config().queue_name.as_str())
        .with_error_code(params.error.as_deref());
    Html(page.render())
}

/// Relay the submitted form field to the queue
///
/// An empty field redirects back to the index page without contacting the
/// broker; a successful send redirects to the index page.
#[instrument(skip_all)]
pub async fn handle_send(
    State(state): State<AppState>,
    Form(form): Form<SendForm>,
) -> Result<Redirect, RelayHandlerError> {
    if form.message_to_send.is_empty() {
        info!("Empty message submitted; nothing sent");
        return Ok(Redirect::to("/?error=empty"));
    }

    info!(size = form.message_to_send.len(), "Relaying submitted message");
    state.relay.send_text(&form.message_to_send).await?;
    Ok(Redirect::to("/"))
}

/// Take at most one message off the queue and show it
#[instrument(skip(state))]
pub async fn handle_receive(
    State(state): State<AppState>,
) -> Result<Html<String>, RelayHandlerError> {
    let outcome = state.relay.try_receive().await?;

    let page = IndexPage::new(state.relay.config().queue_name.as_str())
        .with_received(render_receive_outcome(outcome.as_ref()));
    Ok(Html(page.render()))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
#[instrument(skip(state))]
async fn handle_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let status = state.health_checker.check_health().await;

    let response = HealthResponse {
        status: if status.is_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: Timestamp::now(),
        checks: status.checks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if status.is_healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Readiness check for load balancers
#[instrument(skip(state))]
async fn handle_readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let is_ready = state.health_checker.check_readiness().await;

    let response = ReadinessResponse {
        ready: is_ready,
        timestamp: Timestamp::now(),
    };

    if is_ready {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware
///
/// Logs request start and completion with structured fields and propagates
/// the `x-correlation-id` header, generating one when the caller sent none.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!(correlation_id = %correlation_id, method = %method, uri = %uri, "Request started");

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

// ============================================================================
// Health checking
// ============================================================================

/// Interface for system health monitoring
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    /// Liveness check (fast, no broker calls)
    async fn check_health(&self) -> HealthStatus;

    /// Readiness check for load balancers
    async fn check_readiness(&self) -> bool;
}

/// Health checker reporting the configured relay target
///
/// The broker is not contacted: every relay call opens its own session, so
/// there is no long-lived connection whose state could be reported.
pub struct DefaultHealthChecker {
    relay: Arc<MessageRelay>,
}

impl DefaultHealthChecker {
    pub fn new(relay: Arc<MessageRelay>) -> Self {
        Self { relay }
    }
}

#[async_trait::async_trait]
impl HealthChecker for DefaultHealthChecker {
    async fn check_health(&self) -> HealthStatus {
        let start = std::time::Instant::now();
        let mut checks = HashMap::new();

        checks.insert(
            "service".to_string(),
            HealthCheckResult {
                healthy: true,
                message: "Service is running".to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        );

        let config = self.relay.config();
        checks.insert(
            "relay".to_string(),
            HealthCheckResult {
                healthy: true,
                message: format!(
                    "queue '{}' on {} via {}",
                    config.queue_name, config.endpoint, config.transport
                ),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        );

        HealthStatus {
            is_healthy: true,
            checks,
        }
    }

    async fn check_readiness(&self) -> bool {
        true
    }
}
