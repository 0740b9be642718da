//! # Service Bus Relay Service
//!
//! Binary entry point for the relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes structured logging
//! - Builds the message relay and its session factory
//! - Starts the HTTP server from servicebus-relay-api
//!
//! Exit codes: 1 when the listen address cannot be bound, 2 when the server
//! fails while running, 3 for configuration errors.

mod bootstrap;

use servicebus_relay_api::{start_server, DefaultHealthChecker, LoggingConfig, ServiceError};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let explicit_path = std::env::var(bootstrap::CONFIG_FILE_ENV).ok();

    let service_config = match bootstrap::load_config(explicit_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            bootstrap::init_tracing(&LoggingConfig::default());
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    bootstrap::init_tracing(&service_config.logging);
    info!("Starting Service Bus relay");
    if let Some(path) = explicit_path.as_deref().filter(|p| !p.is_empty()) {
        info!(path = %path, "Configuration loaded from explicit path");
    }

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    let relay = match bootstrap::build_relay(&service_config) {
        Ok(relay) => relay,
        Err(e) => {
            error!(error = %e, "Failed to build the message relay; aborting");
            std::process::exit(3);
        }
    };
    let health_checker = Arc::new(DefaultHealthChecker::new(Arc::clone(&relay)));

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, relay, health_checker).await {
        error!("Server stopped with an error: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }
}
