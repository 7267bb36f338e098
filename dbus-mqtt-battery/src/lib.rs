//! D-Bus to MQTT bridge for a battery management system.
//!
//! This bridge reads the value tree of one battery service on D-Bus every
//! poll interval, folds it into a two-level document and publishes it to
//! an MQTT topic.
//!
//! # Pipeline
//!
//! ```text
//! SnapshotSource::read -> normalize -> NestedTree::build -> serialize -> Publisher
//! ```
//!
//! # Payload
//!
//! ```text
//! /Dc/0/Voltage = 52.1  ┐
//! /Dc/0/Power   = 100   ├─>  {"Dc":{"Power":100,"Voltage":52.1},"Soc":87}
//! /Soc          = 87    │
//! /Serial       = "abc" ┘   (excluded)
//! ```

pub mod config;
pub mod normalize;
pub mod poller;
pub mod snapshot;
pub mod tree;

pub use config::{BatteryBridgeConfig, BatteryConfig, BusKind};
pub use normalize::{ExclusionSet, NormalizedEntry, normalize};
pub use poller::{BatteryPoller, CycleReport};
pub use snapshot::{DbusSnapshotReader, RawSnapshot, SnapshotError, SnapshotSource, read_or_empty};
pub use tree::{NestedTree, Node, build};
