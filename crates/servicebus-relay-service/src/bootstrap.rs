//! Configuration loading, logging setup and relay construction.

use servicebus_relay_api::{ConfigError, LoggingConfig, ServiceConfig};
use servicebus_relay_core::{
    InMemoryBroker, MessageRelay, RelayConfig, StandardSessionFactory, TransportKind,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;

/// Environment variable naming an extra configuration file
pub const CONFIG_FILE_ENV: &str = "SBR_CONFIG_FILE";

/// Prefix of configuration environment variables (`SBR__SERVER__PORT`)
pub const ENV_PREFIX: &str = "SBR";

const SYSTEM_CONFIG: &str = "/etc/servicebus-relay/service";
const LOCAL_CONFIG: &str = "config/service";

/// Load the service configuration
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/servicebus-relay/service.yaml`
///  2. `./config/service.yaml`
///  3. `explicit_path`, normally taken from `SBR_CONFIG_FILE` (must exist)
///  4. Environment variables prefixed `SBR__`, e.g. `SBR__RELAY__QUEUE_NAME`
///
/// Every field has a default, so missing files are fine. A malformed file or
/// a value of the wrong type is an error.
pub fn load_config(explicit_path: Option<&str>) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name(SYSTEM_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name(LOCAL_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path.filter(|p| !p.is_empty()) {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let config = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;

    config
        .try_deserialize::<ServiceConfig>()
        .map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "servicebus_relay_service={level},servicebus_relay_api={level},servicebus_relay_core={level},tower_http=info",
            level = logging.level.to_ascii_lowercase()
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

/// Build the relay described by the configuration
///
/// The in-memory transport gets a fresh process-local broker; messages sent
/// through it are lost when the process exits.
pub fn build_relay(config: &ServiceConfig) -> Result<Arc<MessageRelay>, ConfigError> {
    let relay_config = RelayConfig::from_settings(&config.relay)?;

    let mut factory =
        StandardSessionFactory::new().with_request_timeout(config.relay.request_timeout());
    if relay_config.transport == TransportKind::InMemory {
        warn!("Using the in-memory broker; queued messages do not survive a restart");
        factory = factory.with_in_memory_broker(InMemoryBroker::default());
    }

    info!(
        endpoint = %relay_config.endpoint,
        queue = %relay_config.queue_name,
        transport = %relay_config.transport,
        credential = relay_config.credential.kind(),
        "Relay configured"
    );

    Ok(Arc::new(MessageRelay::new(relay_config, Arc::new(factory))))
}
