//! Broker connection lifecycle.
//!
//! The broker client's event loop runs on its own task, driven by
//! [`ConnectionManager::run`]. Every event it reports is mapped to a
//! [`LinkEvent`] and fed through a two-state machine:
//!
//! ```text
//! DISCONNECTED --ConnAck(success)--> CONNECTED
//! CONNECTED    --Lost------------->  DISCONNECTED, poll again immediately
//! DISCONNECTED --Lost / refused---> wait RECONNECT_DELAY, poll again
//! ```
//!
//! Polling the event loop again after a failure is what makes the client
//! attempt a new connection, so at most one attempt is ever in flight.
//! The first attempt after a drop starts right away; only failed attempts
//! are followed by the delay.
//! The only state shared with the publishing side is the [`ConnectionState`]
//! flag.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, Packet, QoS,
};
use tracing::{debug, error, info, trace, warn};

use dbus_mqtt_common::{MqttConfig, mqtt_options};

use crate::error::{BridgeError, Result};

/// Fixed delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(15);

/// Shared "connected" flag.
///
/// Cloning yields another handle to the same flag. Only the
/// [`ConnectionManager`] that created it can change it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    connected: Arc<AtomicBool>,
}

impl ConnectionState {
    /// Create a new flag in the disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the broker handshake has completed and not been lost since.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Store a new value, returning the previous one.
    fn swap(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::AcqRel)
    }
}

/// Connection-relevant events reported by the broker client.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A handshake completed with this return code.
    ConnAck(ConnectReturnCode),
    /// The transport was lost or a connection attempt failed.
    Lost(String),
    /// A message arrived on a subscribed topic.
    Inbound { topic: String, len: usize },
    /// Acks, pings and outgoing packets.
    Other,
}

/// The request side of a broker client.
///
/// All calls only enqueue the request and never wait for the network.
pub trait BrokerClient: Clone + Send + Sync + 'static {
    /// Enqueue a publish.
    fn try_publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<()>;

    /// Enqueue a subscription.
    fn try_subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    /// Enqueue a graceful disconnect.
    fn try_disconnect(&self) -> Result<()>;
}

impl BrokerClient for AsyncClient {
    fn try_publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<()> {
        AsyncClient::try_publish(self, topic, qos, retain, payload).map_err(BridgeError::from)
    }

    fn try_subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        AsyncClient::try_subscribe(self, topic, qos).map_err(BridgeError::from)
    }

    fn try_disconnect(&self) -> Result<()> {
        AsyncClient::try_disconnect(self).map_err(BridgeError::from)
    }
}

/// The event side of a broker client.
pub trait LinkEvents: Send + 'static {
    /// Wait for the next event. Each call after a failure may start a new
    /// connection attempt.
    fn next_event(&mut self) -> impl Future<Output = LinkEvent> + Send;
}

impl LinkEvents for EventLoop {
    async fn next_event(&mut self) -> LinkEvent {
        match self.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => LinkEvent::ConnAck(ack.code),
            Ok(Event::Incoming(Packet::Disconnect)) => {
                LinkEvent::Lost("disconnected by broker".to_string())
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => LinkEvent::Inbound {
                topic: publish.topic,
                len: publish.payload.len(),
            },
            Ok(_) => LinkEvent::Other,
            Err(ConnectionError::ConnectionRefused(code)) => LinkEvent::ConnAck(code),
            Err(e) => LinkEvent::Lost(e.to_string()),
        }
    }
}

/// Create the broker client and its event loop.
///
/// Nothing touches the network until the event loop is polled, which
/// makes this the non-blocking half of a connect; completion is reported
/// later as a [`LinkEvent::ConnAck`].
pub fn connect(
    config: &MqttConfig,
    client_id: &str,
    last_will: Option<LastWill>,
) -> Result<(AsyncClient, EventLoop)> {
    let opts = mqtt_options(config, client_id, last_will)?;

    info!(
        broker = %config.broker_address,
        port = config.broker_port,
        "Connecting to MQTT broker"
    );

    Ok(AsyncClient::new(opts, config.request_capacity))
}

/// Owns the connection flag and reacts to broker connection events.
#[derive(Debug)]
pub struct ConnectionManager<C: BrokerClient> {
    client: C,
    state: ConnectionState,
    broker: String,
    subscribe_topic: Option<String>,
    birth: Option<(String, Vec<u8>)>,
    retry_delay: Duration,
}

impl<C: BrokerClient> ConnectionManager<C> {
    /// Create a manager for `client`; `broker` is only used in log messages.
    pub fn new(client: C, broker: impl Into<String>) -> Self {
        Self {
            client,
            state: ConnectionState::new(),
            broker: broker.into(),
            subscribe_topic: None,
            birth: None,
            retry_delay: RECONNECT_DELAY,
        }
    }

    /// Subscribe to `topic` after every successful handshake.
    pub fn with_subscription(mut self, topic: impl Into<String>) -> Self {
        self.subscribe_topic = Some(topic.into());
        self
    }

    /// Publish a retained message after every successful handshake.
    pub fn with_birth_message(mut self, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        self.birth = Some((topic.into(), payload));
        self
    }

    /// A handle to the connection flag.
    pub fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    /// Handle a completed handshake. Returns whether the bridge is now connected.
    pub fn on_connected(&self, code: ConnectReturnCode) -> bool {
        if code != ConnectReturnCode::Success {
            error!(broker = %self.broker, code = ?code, "Failed to connect to MQTT broker");
            return false;
        }

        self.state.swap(true);
        info!(broker = %self.broker, "Connected to MQTT broker");

        if let Some(topic) = &self.subscribe_topic {
            match self.client.try_subscribe(topic, QoS::AtMostOnce) {
                Ok(()) => debug!(topic = %topic, "Subscribed"),
                Err(e) => warn!(topic = %topic, error = %e, "Failed to subscribe"),
            }
        }

        if let Some((topic, payload)) = &self.birth {
            if let Err(e) =
                self.client
                    .try_publish(topic, QoS::AtLeastOnce, true, payload.clone())
            {
                warn!(topic = %topic, error = %e, "Failed to publish bridge status");
            }
        }

        true
    }

    /// Handle a lost connection or a failed connection attempt.
    ///
    /// Returns whether the bridge was connected before, in which case the
    /// next attempt should start without waiting.
    pub fn on_disconnected(&self, reason: &str) -> bool {
        if self.state.swap(false) {
            warn!(broker = %self.broker, reason = %reason, "Got disconnected from MQTT broker");
            info!(broker = %self.broker, "Trying to reconnect to MQTT broker");
            true
        } else {
            error!(
                broker = %self.broker,
                reason = %reason,
                "Error connecting to MQTT broker"
            );
            warn!(
                "Retrying to connect to {} in {} seconds",
                self.broker,
                self.retry_delay.as_secs()
            );
            false
        }
    }

    /// Drive the connection for the lifetime of the bridge.
    ///
    /// Only this task waits between attempts; publishers keep running and
    /// see the bridge as disconnected in the meantime.
    pub async fn run<E: LinkEvents>(self, mut events: E) {
        loop {
            match events.next_event().await {
                LinkEvent::ConnAck(code) => {
                    if !self.on_connected(code) {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                LinkEvent::Lost(reason) => {
                    if !self.on_disconnected(&reason) {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                LinkEvent::Inbound { topic, len } => {
                    trace!(topic = %topic, bytes = len, "Ignoring inbound message");
                }
                LinkEvent::Other => {}
            }
        }
    }
}
