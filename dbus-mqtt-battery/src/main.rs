//! D-Bus to MQTT bridge for a battery management system.
//!
//! Polls one battery service on D-Bus and publishes its value tree
//! as JSON to an MQTT topic.

use anyhow::{Context, Result};
use dbus_mqtt_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, Format};

use dbus_mqtt_battery::config::BatteryBridgeConfig;
use dbus_mqtt_battery::poller::BatteryPoller;
use dbus_mqtt_battery::snapshot::DbusSnapshotReader;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = BridgeArgs::parse_with_default("dbus-mqtt-battery.json5");

    // Load configuration using the framework's BridgeConfig trait
    let config = BatteryBridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    // Create the bridge runner
    let mut runner = BridgeRunner::new_with_args("battery", config, Some(&args))
        .context("Failed to start the bridge")?
        .with_format(Format::Json);

    let battery = runner.config().battery.clone();
    let reader = DbusSnapshotReader::from_config(&battery);

    tracing::info!(
        service = %reader.service_name(&battery.device),
        interval_ms = battery.poll_interval_ms,
        excluded = battery.exclude.len(),
        "Battery bridge configured"
    );

    // Spawn the poller task
    let poller = BatteryPoller::new(&battery, reader, runner.publisher());
    runner.spawn(poller.run());

    // Build status metadata
    let metadata = serde_json::json!({
        "device": battery.device,
        "service": battery.service_name(),
        "poll_interval_ms": battery.poll_interval_ms,
    });

    // Run until Ctrl+C (handles shutdown gracefully)
    runner
        .run_with_metadata(Some(metadata))
        .await
        .context("Bridge stopped with an error")
}
