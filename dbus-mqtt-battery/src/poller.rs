//! Battery polling and publishing.

use std::time::Duration;

use rumqttc::AsyncClient;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use dbus_mqtt_bridge_framework::{BrokerClient, PublishOutcome, PublishStats, Publisher};

use crate::config::BatteryConfig;
use crate::normalize::{ExclusionSet, normalize};
use crate::snapshot::{SnapshotSource, read_or_empty};
use crate::tree::NestedTree;

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Paths in the raw snapshot.
    pub paths: usize,
    /// Top keys in the published tree.
    pub keys: usize,
    /// Publish outcome, `None` if the tree could not be serialized.
    pub outcome: Option<PublishOutcome>,
}

/// Polls one battery and publishes its tree every interval.
pub struct BatteryPoller<S, C = AsyncClient>
where
    S: SnapshotSource,
    C: BrokerClient,
{
    device: String,
    source: S,
    exclusions: ExclusionSet,
    publisher: Publisher<C>,
    interval: Duration,
    stats: PublishStats,
    available: bool,
}

impl<S, C> BatteryPoller<S, C>
where
    S: SnapshotSource,
    C: BrokerClient,
{
    /// Create a poller for the configured device.
    pub fn new(config: &BatteryConfig, source: S, publisher: Publisher<C>) -> Self {
        Self {
            device: config.device.clone(),
            source,
            exclusions: config.exclude.iter().cloned().collect(),
            publisher,
            interval: config.poll_interval(),
            stats: PublishStats::default(),
            available: true,
        }
    }

    /// Device this poller reads.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Whether the last read reached the device.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Publish outcome totals so far.
    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    /// Run the polling loop.
    ///
    /// Cycles never overlap: a tick that fires while a cycle is still
    /// running is delayed until it has finished.
    pub async fn run(mut self) {
        info!(
            device = %self.device,
            topic = %self.publisher.topic(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting battery poller"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// Perform a single read, transform and publish cycle.
    pub async fn poll_once(&mut self) -> CycleReport {
        let snapshot = read_or_empty(&self.source, &self.device, &mut self.available).await;
        let entries = normalize(&snapshot, &self.exclusions);
        let tree = NestedTree::build(&entries);

        let outcome = match tree.serialize(self.publisher.format()) {
            Ok(payload) => {
                let outcome = self.publisher.publish(payload);
                self.stats.record(&outcome);
                Some(outcome)
            }
            Err(e) => {
                error!(device = %self.device, error = %e, "Failed to serialize battery tree");
                None
            }
        };

        debug!(
            device = %self.device,
            paths = snapshot.len(),
            keys = tree.len(),
            outcome = ?outcome,
            "Poll cycle complete"
        );

        CycleReport {
            paths: snapshot.len(),
            keys: tree.len(),
            outcome,
        }
    }
}
