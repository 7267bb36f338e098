//! Connection-gated payload publisher.

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;

use dbus_mqtt_common::Format;

use crate::connection::{BrokerClient, ConnectionState};
use crate::error::Result;

/// Result of a single publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker client accepted the payload into its queue.
    Accepted,
    /// Not connected; the payload was dropped without touching the client.
    Skipped,
    /// The broker client refused the payload.
    Rejected(String),
}

impl PublishOutcome {
    /// Whether the payload was handed to the broker client.
    pub fn is_accepted(&self) -> bool {
        matches!(self, PublishOutcome::Accepted)
    }
}

/// Publisher for sending payloads to the broker.
///
/// Checks the shared [`ConnectionState`] before every attempt. Payloads are
/// never queued while disconnected: the next payload supersedes them.
#[derive(Clone, Debug)]
pub struct Publisher<C = AsyncClient> {
    client: C,
    state: ConnectionState,
    topic: String,
    format: Format,
    qos: QoS,
}

impl<C: BrokerClient> Publisher<C> {
    /// Create a new publisher.
    pub fn new(
        client: C,
        state: ConnectionState,
        topic: impl Into<String>,
        format: Format,
        qos: QoS,
    ) -> Self {
        Self {
            client,
            state,
            topic: topic.into(),
            format,
            qos,
        }
    }

    /// Get the default topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Get the serialization format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Get the underlying broker client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Whether publishing is currently possible.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Build a full topic from a suffix.
    pub fn build_topic(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            self.topic.clone()
        } else {
            format!("{}/{}", self.topic, suffix)
        }
    }

    /// Publish an already serialized payload to the default topic.
    pub fn publish(&self, payload: Vec<u8>) -> PublishOutcome {
        self.publish_to(&self.topic, payload, false)
    }

    /// Publish raw bytes to a topic.
    pub fn publish_to(&self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishOutcome {
        if !self.state.is_connected() {
            tracing::debug!(topic = %topic, "Not connected, dropping payload");
            return PublishOutcome::Skipped;
        }

        let size = payload.len();
        match self.client.try_publish(topic, self.qos, retain, payload) {
            Ok(()) => {
                tracing::debug!(topic = %topic, bytes = size, "Published payload");
                PublishOutcome::Accepted
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Failed to send message");
                PublishOutcome::Rejected(e.to_string())
            }
        }
    }

    /// Publish a value as JSON regardless of the publisher's format.
    pub fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
        retain: bool,
    ) -> Result<PublishOutcome> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.publish_to(topic, payload, retain))
    }
}

/// Running totals of publish outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Payloads accepted by the broker client.
    pub accepted: usize,
    /// Payloads dropped while disconnected.
    pub skipped: usize,
    /// Payloads refused by the broker client.
    pub rejected: usize,
}

impl PublishStats {
    /// Count one outcome.
    pub fn record(&mut self, outcome: &PublishOutcome) {
        match outcome {
            PublishOutcome::Accepted => self.accepted += 1,
            PublishOutcome::Skipped => self.skipped += 1,
            PublishOutcome::Rejected(_) => self.rejected += 1,
        }
    }

    /// Total number of cycles that produced an outcome.
    pub fn total(&self) -> usize {
        self.accepted + self.skipped + self.rejected
    }

    /// Accepted payloads as a percentage of all attempts.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            (self.accepted as f64 / self.total() as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::error::BridgeError;
    use rumqttc::ConnectReturnCode;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct QueueClient {
        sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        full: bool,
    }

    impl BrokerClient for QueueClient {
        fn try_publish(&self, topic: &str, _qos: QoS, _retain: bool, payload: Vec<u8>) -> Result<()> {
            if self.full {
                return Err(BridgeError::client("request queue full"));
            }
            self.sent.lock().unwrap().push((topic.to_string(), payload));
            Ok(())
        }

        fn try_subscribe(&self, _topic: &str, _qos: QoS) -> Result<()> {
            Ok(())
        }

        fn try_disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    fn publisher(client: QueueClient) -> (Publisher<QueueClient>, ConnectionManager<QueueClient>) {
        let manager = ConnectionManager::new(client.clone(), "test");
        let publisher = Publisher::new(client, manager.state(), "bms", Format::Json, QoS::AtMostOnce);
        (publisher, manager)
    }

    #[test]
    fn test_build_topic() {
        let (publisher, _manager) = publisher(QueueClient::default());
        assert_eq!(publisher.build_topic("status"), "bms/status");
        assert_eq!(publisher.build_topic(""), "bms");
    }

    #[test]
    fn test_skipped_while_disconnected() {
        let client = QueueClient::default();
        let (publisher, _manager) = publisher(client.clone());

        assert_eq!(publisher.publish(b"{}".to_vec()), PublishOutcome::Skipped);
        assert!(client.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_accepted_once_connected() {
        let client = QueueClient::default();
        let (publisher, manager) = publisher(client.clone());
        manager.on_connected(ConnectReturnCode::Success);

        assert_eq!(publisher.publish(b"{}".to_vec()), PublishOutcome::Accepted);
        assert_eq!(
            client.sent.lock().unwrap().as_slice(),
            &[("bms".to_string(), b"{}".to_vec())]
        );
    }

    #[test]
    fn test_rejected_is_not_an_error() {
        let client = QueueClient {
            full: true,
            ..Default::default()
        };
        let (publisher, manager) = publisher(client);
        manager.on_connected(ConnectReturnCode::Success);

        let outcome = publisher.publish(b"{}".to_vec());
        assert!(matches!(outcome, PublishOutcome::Rejected(ref msg) if msg.contains("queue full")));
    }

    #[test]
    fn test_publish_json() {
        let client = QueueClient::default();
        let (publisher, manager) = publisher(client.clone());
        manager.on_connected(ConnectReturnCode::Success);

        let outcome = publisher
            .publish_json("bms/status", &serde_json::json!({ "status": "running" }), true)
            .unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(
            client.sent.lock().unwrap()[0].1,
            br#"{"status":"running"}"#.to_vec()
        );
    }

    #[test]
    fn test_publish_stats() {
        let mut stats = PublishStats::default();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.success_rate(), 100.0);

        for _ in 0..8 {
            stats.record(&PublishOutcome::Accepted);
        }
        stats.record(&PublishOutcome::Skipped);
        stats.record(&PublishOutcome::Rejected("full".into()));
        assert_eq!(stats.total(), 10);
        assert_eq!(stats.success_rate(), 80.0);
    }
}
