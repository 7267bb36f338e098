//! D-Bus to MQTT Bridge Framework
//!
//! Common abstractions for building bridges that publish bus data to an MQTT broker.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`ConnectionManager`] tracking broker connectivity and retrying every 15 seconds
//! - [`Publisher`] for connection-gated, non-blocking publishing
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use dbus_mqtt_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
//!
//!     // Spawn bus-specific workers
//!     runner.spawn(my_worker(runner.publisher()));
//!
//!     // Run until Ctrl+C
//!     runner.run_with_metadata(None).await
//! }
//! ```

mod args;
mod config;
mod connection;
mod error;
mod publisher;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use connection::{
    BrokerClient, ConnectionManager, ConnectionState, LinkEvent, LinkEvents, RECONNECT_DELAY,
    connect,
};
pub use error::{BridgeError, Result};
pub use publisher::{PublishOutcome, PublishStats, Publisher};
pub use runner::BridgeRunner;
pub use status::{BridgeStatus, StatusPublisher, status_topic};

// Re-export commonly used types from dbus-mqtt-common
pub use dbus_mqtt_common::{BusValue, Format, LoggingConfig, MqttConfig};
