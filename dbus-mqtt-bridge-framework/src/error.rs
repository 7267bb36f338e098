//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// The broker client refused a request (queue full, client gone).
    #[error("Broker client error: {0}")]
    Client(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a broker client error.
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }
}

impl From<dbus_mqtt_common::Error> for BridgeError {
    fn from(err: dbus_mqtt_common::Error) -> Self {
        match err {
            dbus_mqtt_common::Error::Json(e) => Self::Serialization(e.to_string()),
            dbus_mqtt_common::Error::Cbor(e) => Self::Serialization(e),
            dbus_mqtt_common::Error::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Client(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for BridgeError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_error_mapping() {
        let err: BridgeError = dbus_mqtt_common::Error::Config("bad".into()).into();
        assert!(matches!(err, BridgeError::Config(_)));

        let err: BridgeError = dbus_mqtt_common::Error::Cbor("short".into()).into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }

    #[test]
    fn test_display() {
        let err = BridgeError::ConfigNotFound {
            path: "battery.json5".into(),
        };
        assert_eq!(err.to_string(), "Configuration file not found: battery.json5");

        let err = BridgeError::client("request queue full");
        assert_eq!(err.to_string(), "Broker client error: request queue full");
    }
}
