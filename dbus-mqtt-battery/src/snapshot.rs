//! Snapshot reading from the battery service.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info};
use zbus::Connection;
use zbus::zvariant::{OwnedValue, Value};

use dbus_mqtt_common::BusValue;

use crate::config::{BatteryConfig, BusKind};

/// Interface every Venus OS style bus item implements.
pub const BUS_ITEM_INTERFACE: &str = "com.victronenergy.BusItem";

const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

/// Error type for snapshot reads.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Bus connection failed: {0}")]
    Bus(String),
    #[error("Device '{0}' is not present on the bus")]
    DeviceUnavailable(String),
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

/// One complete read of a device's path-keyed value tree.
///
/// Entries keep the order they were inserted in. `None` marks a path the
/// device exposes without a current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    entries: Vec<(String, Option<BusValue>)>,
}

impl RawSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a path and its value.
    pub fn insert(&mut self, path: impl Into<String>, value: Option<BusValue>) {
        self.entries.push((path.into(), value));
    }

    /// Iterate over `(path, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&BusValue>)> {
        self.entries
            .iter()
            .map(|(path, value)| (path.as_str(), value.as_ref()))
    }

    /// Number of paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no paths at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: Into<String>> FromIterator<(P, Option<BusValue>)> for RawSnapshot {
    fn from_iter<I: IntoIterator<Item = (P, Option<BusValue>)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(path, value)| (path.into(), value))
                .collect(),
        }
    }
}

/// Something that can produce a [`RawSnapshot`] for a device.
///
/// Every call must query the live source; implementations never cache.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Read the whole value tree of `device`.
    fn read(&self, device: &str) -> impl Future<Output = Result<RawSnapshot, SnapshotError>> + Send;
}

/// Read a snapshot, turning any failure into an empty one.
///
/// A missing device is an expected condition (the BMS driver restarts,
/// the cable gets unplugged). `available` tracks the previous read so that
/// only the transitions are logged at info level; repeated failures go to
/// debug.
pub async fn read_or_empty<S: SnapshotSource>(
    source: &S,
    device: &str,
    available: &mut bool,
) -> RawSnapshot {
    match source.read(device).await {
        Ok(snapshot) => {
            if !*available {
                info!(device = %device, paths = snapshot.len(), "Battery available again");
                *available = true;
            }
            snapshot
        }
        Err(e) => {
            if *available {
                info!(device = %device, error = %e, "Battery not available, publishing empty snapshot");
                *available = false;
            } else {
                debug!(device = %device, error = %e, "Battery still not available");
            }
            RawSnapshot::new()
        }
    }
}

/// Reads snapshots over D-Bus with a single `GetValue` call on the root item.
pub struct DbusSnapshotReader {
    bus: BusKind,
    service_prefix: String,
    timeout: Duration,
    connection: OnceCell<Connection>,
}

impl DbusSnapshotReader {
    /// Create a reader. The bus connection is opened on the first read.
    pub fn new(bus: BusKind, service_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus: bus.resolve(),
            service_prefix: service_prefix.into(),
            timeout,
            connection: OnceCell::new(),
        }
    }

    /// Create a reader from the battery configuration.
    pub fn from_config(config: &BatteryConfig) -> Self {
        Self::new(
            config.bus,
            config.service_prefix.clone(),
            config.read_timeout(),
        )
    }

    /// Service name of `device`.
    pub fn service_name(&self, device: &str) -> String {
        format!("{}.{}", self.service_prefix, device)
    }

    async fn connection(&self) -> Result<&Connection, SnapshotError> {
        self.connection
            .get_or_try_init(|| async {
                let conn = match self.bus {
                    BusKind::Session => Connection::session().await,
                    _ => Connection::system().await,
                };
                conn.map_err(|e| SnapshotError::Bus(e.to_string()))
            })
            .await
    }

    async fn get_root_value(&self, service: &str) -> Result<RawSnapshot, SnapshotError> {
        let conn = self.connection().await?;

        let reply = conn
            .call_method(Some(service), "/", Some(BUS_ITEM_INTERFACE), "GetValue", &())
            .await
            .map_err(|e| match e {
                zbus::Error::MethodError(ref name, _, _) if name.as_str() == SERVICE_UNKNOWN => {
                    SnapshotError::DeviceUnavailable(service.to_string())
                }
                other => SnapshotError::Bus(other.to_string()),
            })?;

        let body = reply.body();
        let items = match body.deserialize::<HashMap<String, OwnedValue>>() {
            Ok(items) => items,
            Err(_) => {
                let value = body
                    .deserialize::<OwnedValue>()
                    .map_err(|e| SnapshotError::Malformed(e.to_string()))?;
                value_to_items(Value::from(value))?
            }
        };

        Ok(snapshot_from_items(items))
    }
}

impl SnapshotSource for DbusSnapshotReader {
    async fn read(&self, device: &str) -> Result<RawSnapshot, SnapshotError> {
        let service = self.service_name(device);

        let snapshot = tokio::time::timeout(self.timeout, self.get_root_value(&service))
            .await
            .map_err(|_| SnapshotError::Timeout(self.timeout))??;

        debug!(service = %service, paths = snapshot.len(), "Read battery snapshot");
        Ok(snapshot)
    }
}

/// Unwrap the root reply into the path dictionary.
fn value_to_items(value: Value<'_>) -> Result<HashMap<String, OwnedValue>, SnapshotError> {
    match value {
        Value::Value(inner) => value_to_items(*inner),
        Value::Dict(dict) => {
            HashMap::<String, OwnedValue>::try_from(dict).map_err(|e: zbus::zvariant::Error| {
                SnapshotError::Malformed(e.to_string())
            })
        }
        other => Err(SnapshotError::Malformed(format!(
            "expected a dictionary, got signature '{}'",
            other.value_signature()
        ))),
    }
}

/// Build a path-ordered snapshot from the root dictionary.
///
/// The root item reports paths without the leading slash.
fn snapshot_from_items(items: HashMap<String, OwnedValue>) -> RawSnapshot {
    let sorted: BTreeMap<String, Option<BusValue>> = items
        .into_iter()
        .map(|(path, value)| {
            let path = if path.starts_with('/') {
                path
            } else {
                format!("/{}", path)
            };
            (path, convert_value(&value))
        })
        .collect();

    sorted.into_iter().collect()
}

/// Convert a bus variant into a scalar.
///
/// Invalid items are sent as an empty array; they and any other
/// non-scalar become `None`.
pub fn convert_value(value: &Value<'_>) -> Option<BusValue> {
    match value {
        Value::U8(v) => Some(BusValue::Integer(i64::from(*v))),
        Value::I16(v) => Some(BusValue::Integer(i64::from(*v))),
        Value::U16(v) => Some(BusValue::Integer(i64::from(*v))),
        Value::I32(v) => Some(BusValue::Integer(i64::from(*v))),
        Value::U32(v) => Some(BusValue::Integer(i64::from(*v))),
        Value::I64(v) => Some(BusValue::Integer(*v)),
        Value::U64(v) => Some(BusValue::from(*v)),
        Value::F64(v) => BusValue::float(*v),
        Value::Bool(v) => Some(BusValue::Boolean(*v)),
        Value::Str(s) => Some(BusValue::Text(s.as_str().to_string())),
        Value::Value(inner) => convert_value(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_scalars() {
        assert_eq!(convert_value(&Value::U8(7)), Some(BusValue::Integer(7)));
        assert_eq!(convert_value(&Value::I32(-12)), Some(BusValue::Integer(-12)));
        assert_eq!(convert_value(&Value::F64(52.1)), Some(BusValue::Float(52.1)));
        assert_eq!(convert_value(&Value::Bool(true)), Some(BusValue::Boolean(true)));
        assert_eq!(
            convert_value(&Value::from("JK-B2A24S")),
            Some(BusValue::from("JK-B2A24S"))
        );
    }

    #[test]
    fn test_convert_non_finite_is_absent() {
        assert_eq!(convert_value(&Value::F64(f64::NAN)), None);
        assert_eq!(convert_value(&Value::F64(f64::INFINITY)), None);
    }

    #[test]
    fn test_convert_invalid_item_is_absent() {
        let empty: Vec<i32> = Vec::new();
        assert_eq!(convert_value(&Value::from(empty)), None);
    }

    #[test]
    fn test_convert_nested_variant() {
        let nested = Value::Value(Box::new(Value::U32(100)));
        assert_eq!(convert_value(&nested), Some(BusValue::Integer(100)));
    }

    #[test]
    fn test_snapshot_from_items_sorted_with_slash() {
        let mut items = HashMap::new();
        items.insert("Soc".to_string(), OwnedValue::from(87u32));
        items.insert("Dc/0/Voltage".to_string(), OwnedValue::from(52.1f64));
        items.insert("/Dc/0/Current".to_string(), OwnedValue::from(-3.5f64));

        let snapshot = snapshot_from_items(items);
        let paths: Vec<&str> = snapshot.iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["/Dc/0/Current", "/Dc/0/Voltage", "/Soc"]);
    }

    #[test]
    fn test_raw_snapshot_keeps_insertion_order() {
        let snapshot: RawSnapshot = vec![
            ("/Soc", Some(BusValue::Integer(87))),
            ("/Dc/0/Power", None),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.len(), 2);
        let first = snapshot.iter().next().unwrap();
        assert_eq!(first, ("/Soc", Some(&BusValue::Integer(87))));
    }

    struct Missing;

    impl SnapshotSource for Missing {
        async fn read(&self, device: &str) -> Result<RawSnapshot, SnapshotError> {
            Err(SnapshotError::DeviceUnavailable(device.to_string()))
        }
    }

    struct Present;

    impl SnapshotSource for Present {
        async fn read(&self, _device: &str) -> Result<RawSnapshot, SnapshotError> {
            Ok(vec![("/Soc", Some(BusValue::Integer(87)))].into_iter().collect())
        }
    }

    #[tokio::test]
    async fn test_read_or_empty_swallows_errors() {
        let mut available = true;
        let snapshot = read_or_empty(&Missing, "ttyUSB0", &mut available).await;
        assert!(snapshot.is_empty());
        assert!(!available);
    }

    #[tokio::test]
    async fn test_read_or_empty_tracks_availability() {
        let mut available = true;

        for _ in 0..3 {
            read_or_empty(&Missing, "ttyUSB0", &mut available).await;
            assert!(!available);
        }

        let snapshot = read_or_empty(&Present, "ttyUSB0", &mut available).await;
        assert_eq!(snapshot.len(), 1);
        assert!(available);

        read_or_empty(&Present, "ttyUSB0", &mut available).await;
        assert!(available);
    }
}
