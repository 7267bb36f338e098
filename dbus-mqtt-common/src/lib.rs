//! D-Bus to MQTT Common Library
//!
//! Shared types and utilities for bridges that forward device-bus data to an
//! MQTT broker:
//!
//! - [`value`] - Scalar bus value model (`BusValue`)
//! - [`serialization`] - JSON/CBOR payload encoding and decoding
//! - [`config`] - Broker, TLS and logging configuration (JSON5 format)
//! - [`session`] - Broker client option building
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod serialization;
pub mod session;
pub mod value;

// Re-export commonly used types at the crate root
pub use config::{
    BaseConfig, LogFormat, LoggingConfig, MqttConfig, PLACEHOLDER_BROKER_ADDRESS, TlsConfig,
    load_config, parse_config,
};
pub use error::{Error, Result};
pub use serialization::{Format, decode, encode};
pub use session::{mqtt_options, qos};
pub use value::BusValue;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
