//! Configuration for the battery bridge.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dbus_mqtt_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, MqttConfig, Result};

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryBridgeConfig {
    /// MQTT broker settings.
    pub mqtt: MqttConfig,

    /// Battery service settings.
    pub battery: BatteryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which D-Bus bus the battery service lives on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Session bus if `DBUS_SESSION_BUS_ADDRESS` is set, system bus otherwise.
    #[default]
    Auto,
    /// The system bus (Venus OS).
    System,
    /// The session bus (development setups).
    Session,
}

impl BusKind {
    /// Resolve `Auto` against the environment.
    pub fn resolve(self) -> BusKind {
        match self {
            BusKind::Auto if std::env::var_os("DBUS_SESSION_BUS_ADDRESS").is_some() => {
                BusKind::Session
            }
            BusKind::Auto => BusKind::System,
            other => other,
        }
    }
}

/// Battery service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// Device identifier, e.g. "ttyUSB0".
    pub device: String,

    /// Well-known name prefix; the service is `<service_prefix>.<device>`.
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,

    /// Bus to connect to.
    #[serde(default)]
    pub bus: BusKind,

    /// Poll interval in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound for a single snapshot read in milliseconds (default: 1000).
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Field names never forwarded to the broker.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_service_prefix() -> String {
    "com.victronenergy.battery".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_read_timeout() -> u64 {
    1000
}

/// Fields that only describe the device or the driver process.
pub const DEFAULT_EXCLUDE: &[&str] = &[
    "Serial",
    "FirmwareVersion",
    "HardwareVersion",
    "ProductId",
    "ProductName",
    "DeviceInstance",
    "CustomName",
    "Connected",
    "ProcessName",
    "ProcessVersion",
    "Connection",
];

fn default_exclude() -> Vec<String> {
    DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect()
}

impl BatteryConfig {
    /// Create a configuration for `device` with defaults for everything else.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            service_prefix: default_service_prefix(),
            bus: BusKind::default(),
            poll_interval_ms: default_poll_interval(),
            read_timeout_ms: default_read_timeout(),
            exclude: default_exclude(),
        }
    }

    /// Well-known bus name of the battery service.
    pub fn service_name(&self) -> String {
        format!("{}.{}", self.service_prefix, self.device)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Read timeout as a duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl BridgeConfig for BatteryBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn client_id(&self) -> String {
        format!("MqttBatterySender_{}", self.battery.device)
    }

    fn validate(&self) -> Result<()> {
        self.validate_mqtt()?;

        if self.battery.device.trim().is_empty() {
            return Err(BridgeError::validation("battery.device cannot be empty"));
        }
        if self.battery.device.contains(['/', ' ']) {
            return Err(BridgeError::validation(format!(
                "battery.device '{}' is not a valid bus name element",
                self.battery.device
            )));
        }
        if self.battery.service_prefix.is_empty() {
            return Err(BridgeError::validation(
                "battery.service_prefix cannot be empty",
            ));
        }
        if self.battery.poll_interval_ms == 0 {
            return Err(BridgeError::validation(
                "battery.poll_interval_ms must be > 0",
            ));
        }
        if self.battery.read_timeout_ms == 0 {
            return Err(BridgeError::validation(
                "battery.read_timeout_ms must be > 0",
            ));
        }

        Ok(())
    }
}
