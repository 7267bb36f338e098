//! Bridge status reporting.

use rumqttc::{LastWill, QoS};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::connection::BrokerClient;
use crate::publisher::{PublishOutcome, Publisher};

/// Topic carrying the bridge status for a payload topic.
pub fn status_topic(topic: &str) -> String {
    format!("{}/status", topic)
}

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "battery").
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running" or "offline").
    pub status: String,
    /// Unix epoch milliseconds when the status was produced.
    pub timestamp: i64,
    /// Additional metadata (bridge-specific).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    fn with_status(bridge: impl Into<String>, version: impl Into<String>, status: &str) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: status.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a new status with "running" state.
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(bridge, version, "running")
    }

    /// Create a status with "offline" state.
    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(bridge, version, "offline")
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Serialize as a JSON payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Publish this status, retained, to `{topic}/status`.
    pub fn publish<C: BrokerClient>(&self, publisher: &Publisher<C>) -> Result<PublishOutcome> {
        let topic = status_topic(publisher.topic());
        publisher.publish_json(&topic, self, true)
    }

    /// Last will registering this status on `{topic}/status`.
    pub fn last_will(&self, topic: &str) -> Result<LastWill> {
        Ok(LastWill::new(
            status_topic(topic),
            self.to_payload()?,
            QoS::AtLeastOnce,
            true,
        ))
    }
}

/// Helper to publish bridge status on startup and shutdown.
pub struct StatusPublisher<C: BrokerClient> {
    publisher: Publisher<C>,
    bridge_name: String,
    version: String,
}

impl<C: BrokerClient> StatusPublisher<C> {
    /// Create a new status publisher.
    pub fn new(
        publisher: Publisher<C>,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            bridge_name: bridge_name.into(),
            version: version.into(),
        }
    }

    /// "running" status payload with optional metadata.
    pub fn running_payload(&self, metadata: Option<serde_json::Value>) -> Result<Vec<u8>> {
        let mut status = BridgeStatus::running(&self.bridge_name, &self.version);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        status.to_payload()
    }

    /// Publish "offline" status.
    pub fn publish_offline(&self) -> Result<PublishOutcome> {
        BridgeStatus::offline(&self.bridge_name, &self.version).publish(&self.publisher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_running() {
        let status = BridgeStatus::running("battery", "0.1.0");
        assert_eq!(status.bridge, "battery");
        assert_eq!(status.status, "running");
        assert!(status.timestamp > 0);
    }

    #[test]
    fn test_status_with_metadata() {
        let status = BridgeStatus::running("battery", "0.1.0").with_metadata(serde_json::json!({
            "device": "ttyUSB0",
            "poll_interval_ms": 1000
        }));

        assert_eq!(status.metadata["device"], "ttyUSB0");
        assert_eq!(status.metadata["poll_interval_ms"], 1000);
    }

    #[test]
    fn test_status_serialization() {
        let status =
            BridgeStatus::running("test", "1.0.0").with_metadata(serde_json::json!({ "count": 5 }));

        let json = String::from_utf8(status.to_payload().unwrap()).unwrap();
        assert!(json.contains("\"bridge\":\"test\""));
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"count\":5"));
    }

    #[test]
    fn test_last_will_topic() {
        let will = BridgeStatus::offline("battery", "0.1.0")
            .last_will("venus/bms")
            .unwrap();
        assert_eq!(will.topic, "venus/bms/status");
        assert!(will.retain);
        assert_eq!(status_topic("a/b"), "a/b/status");
    }
}
