//! Broker transport implementations.
//!
//! This module contains concrete implementations of the `BrokerSession` and
//! `QueueClient` traits for the supported transports.

pub mod memory;
pub mod servicebus;

pub use memory::{BrokerStats, InMemoryBroker, InMemoryBrokerConfig, InMemorySession};
pub use servicebus::HttpsSession;
