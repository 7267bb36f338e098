//! Bridge runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, QoS};
use tokio::signal;
use tokio::task::JoinHandle;

use dbus_mqtt_common::{Format, LoggingConfig, init_tracing, qos};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, connect};
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::status::{BridgeStatus, StatusPublisher, status_topic};

/// Bridge runner that manages the lifecycle of a bus bridge.
///
/// Handles:
/// - Logging initialization
/// - Broker client setup (TLS, credentials, last will)
/// - The connection manager task
/// - Task spawning and management
/// - Status publishing and graceful shutdown on Ctrl+C
///
/// # Example
///
/// ```ignore
/// use dbus_mqtt_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
///
///     // Spawn workers using the publisher
///     let publisher = runner.publisher();
///     runner.spawn(async move {
///         // Worker logic here
///     });
///
///     runner.run_with_metadata(None).await
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// The loaded configuration.
    config: C,
    /// Broker client event loop, handed to the connection manager in `run_with_metadata`.
    events: EventLoop,
    /// Connection manager owning the connected flag.
    manager: ConnectionManager<AsyncClient>,
    /// Publisher for payloads.
    publisher: Publisher,
    /// Status publisher.
    status_publisher: StatusPublisher<AsyncClient>,
    /// QoS for payloads.
    qos: QoS,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner with CLI args for log level override.
    ///
    /// This will:
    /// 1. Initialize logging based on config (with optional CLI override)
    /// 2. Create the broker client with an "offline" last will
    /// 3. Create the publisher
    ///
    /// No connection is attempted until [`run_with_metadata`](Self::run_with_metadata).
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        // Initialize logging with optional CLI override
        let mut log_config: LoggingConfig = config.logging().clone();
        if let Some(level) = args.and_then(|a| a.log_level.clone()) {
            log_config.level = level;
        }

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let mqtt = config.mqtt();
        let client_id = config.resolved_client_id();
        let qos = qos(mqtt.qos)?;

        let will = BridgeStatus::offline(&name, &version).last_will(config.topic())?;
        let (client, events) = connect(mqtt, &client_id, Some(will))?;

        let broker = format!("{}:{}", mqtt.broker_address, mqtt.broker_port);
        let manager = ConnectionManager::new(client.clone(), broker);

        let publisher = Publisher::new(
            client,
            manager.state(),
            config.topic(),
            Format::Json, // Default to JSON, can be overridden
            qos,
        );
        let status_publisher = StatusPublisher::new(publisher.clone(), &name, &version);

        tracing::info!(client_id = %client_id, topic = %config.topic(), "Broker client ready");

        Ok(Self {
            name,
            config,
            events,
            manager,
            publisher,
            status_publisher,
            qos,
            tasks: Vec::new(),
        })
    }

    /// Set a custom serialization format for the publisher.
    pub fn with_format(mut self, format: Format) -> Self {
        self.publisher = Publisher::new(
            self.publisher.client().clone(),
            self.manager.state(),
            self.publisher.topic(),
            format,
            self.qos,
        );
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Spawn a worker task.
    ///
    /// The task will be tracked and aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Run the bridge until Ctrl+C is received.
    ///
    /// This will:
    /// 1. Start the connection manager (subscribes and publishes "running",
    ///    with `metadata`, on each connect)
    /// 2. Wait for Ctrl+C signal
    /// 3. Abort all spawned tasks
    /// 4. Publish "offline" status and disconnect from the broker
    pub async fn run_with_metadata(self, metadata: Option<serde_json::Value>) -> Result<()> {
        let birth = self.status_publisher.running_payload(metadata)?;
        let manager = self
            .manager
            .with_subscription(self.config.topic())
            .with_birth_message(status_topic(self.config.topic()), birth);
        let state = manager.state();
        let connection = tokio::spawn(manager.run(self.events));

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        // Wait for shutdown signal
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }

        tracing::info!(bridge = %self.name, "Received shutdown signal");

        // Abort all tasks
        for task in &self.tasks {
            task.abort();
        }

        if state.is_connected() {
            if let Err(e) = self.status_publisher.publish_offline() {
                tracing::warn!(error = %e, "Failed to publish offline status");
            }
            if let Err(e) = self.publisher.client().try_disconnect() {
                tracing::warn!(error = %e, "Error disconnecting from broker");
            }
        }

        // Give the event loop a moment to flush the last requests
        tokio::time::sleep(Duration::from_millis(500)).await;
        connection.abort();

        tracing::info!(bridge = %self.name, "Goodbye!");

        Ok(())
    }
}
