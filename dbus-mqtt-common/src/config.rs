use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::serialization::Format;

/// Broker address shipped in the sample configuration; never a real host.
pub const PLACEHOLDER_BROKER_ADDRESS: &str = "IP_ADDR_OR_FQDN";

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address.
    pub broker_address: String,

    /// Broker TCP port.
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    /// Topic the bridge publishes to (and subscribes to after connecting).
    pub topic: String,

    /// Client identifier. Bridges derive one from the device when unset.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// QoS level for published payloads (0, 1 or 2).
    #[serde(default)]
    pub qos: u8,

    /// Capacity of the client's outgoing request queue.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,

    /// Broker username. Only used together with a non-empty password.
    #[serde(default)]
    pub username: Option<String>,

    /// Broker password.
    #[serde(default)]
    pub password: Option<String>,

    /// TLS settings.
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_broker_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_request_capacity() -> usize {
    10
}

impl MqttConfig {
    /// Create a plain TCP configuration with defaults for everything else.
    pub fn new(broker_address: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker_address: broker_address.into(),
            broker_port: default_broker_port(),
            topic: topic.into(),
            client_id: None,
            keep_alive_secs: default_keep_alive(),
            qos: 0,
            request_capacity: default_request_capacity(),
            username: None,
            password: None,
            tls: TlsConfig::default(),
        }
    }

    /// Username and password, if both are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    /// Check the broker settings for values the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.broker_address.trim().is_empty() {
            return Err(Error::Config("mqtt.broker_address cannot be empty".into()));
        }
        if self.broker_address == PLACEHOLDER_BROKER_ADDRESS {
            return Err(Error::Config(format!(
                "mqtt.broker_address still uses the placeholder '{}'",
                PLACEHOLDER_BROKER_ADDRESS
            )));
        }
        if self.broker_port == 0 {
            return Err(Error::Config("mqtt.broker_port must be 1-65535".into()));
        }
        if self.topic.is_empty() {
            return Err(Error::Config("mqtt.topic cannot be empty".into()));
        }
        if self.topic.contains(['+', '#']) {
            return Err(Error::Config(format!(
                "mqtt.topic '{}' must not contain wildcards",
                self.topic
            )));
        }
        if let Some(id) = &self.client_id {
            if id.starts_with(' ') {
                return Err(Error::Config(
                    "mqtt.client_id must not start with a space".into(),
                ));
            }
        }
        if self.qos > 2 {
            return Err(Error::Config(format!(
                "mqtt.qos must be 0, 1 or 2 (got {})",
                self.qos
            )));
        }
        if self.request_capacity == 0 {
            return Err(Error::Config("mqtt.request_capacity must be at least 1".into()));
        }
        if self.tls.ca_path.is_some() && !self.tls.enabled {
            return Err(Error::Config(
                "mqtt.tls.ca_path is set but TLS is not enabled".into(),
            ));
        }
        Ok(())
    }
}

/// TLS settings for the broker connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Connect over TLS.
    #[serde(default)]
    pub enabled: bool,

    /// Custom CA certificate (PEM). System roots are used when unset.
    #[serde(default)]
    pub ca_path: Option<PathBuf>,

    /// Skip verification of the server hostname.
    #[serde(default)]
    pub insecure: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Settings shared by every bridge configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Broker connection settings.
    pub mqtt: MqttConfig,

    /// Serialization format for payloads.
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
