//! Path normalization and filtering.
//!
//! Battery services expose paths like `/Dc/0/Voltage`, where the `/0/`
//! segment is an enumeration index that is always zero for a single
//! battery. Normalization removes that index and splits the path into a
//! top key and an optional sub key:
//!
//! ```text
//! /Dc/0/Voltage  ->  (Dc, Some(Voltage))
//! /Soc           ->  (Soc, None)
//! /Io/Cells/3/V  ->  skipped (more than two segments)
//! ```

use std::collections::HashSet;

use dbus_mqtt_common::BusValue;

use crate::snapshot::RawSnapshot;

/// Field names that are never forwarded, matched against the last path segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    fields: HashSet<String>,
}

impl ExclusionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `field` is excluded.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Number of excluded field names.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A filtered value with its one- or two-level key.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub top_key: String,
    pub sub_key: Option<String>,
    pub value: BusValue,
}

impl NormalizedEntry {
    /// Entry without a sub key.
    pub fn flat(top_key: impl Into<String>, value: impl Into<BusValue>) -> Self {
        Self {
            top_key: top_key.into(),
            sub_key: None,
            value: value.into(),
        }
    }

    /// Entry nested under `top_key`.
    pub fn nested(
        top_key: impl Into<String>,
        sub_key: impl Into<String>,
        value: impl Into<BusValue>,
    ) -> Self {
        Self {
            top_key: top_key.into(),
            sub_key: Some(sub_key.into()),
            value: value.into(),
        }
    }
}

/// Normalize and filter every entry of a snapshot, keeping snapshot order.
pub fn normalize(snapshot: &RawSnapshot, exclusions: &ExclusionSet) -> Vec<NormalizedEntry> {
    snapshot
        .iter()
        .filter_map(|(path, value)| normalize_entry(path, value?, exclusions))
        .collect()
}

/// Normalize a single path. Returns `None` when the entry is dropped.
pub fn normalize_entry(
    path: &str,
    value: &BusValue,
    exclusions: &ExclusionSet,
) -> Option<NormalizedEntry> {
    let path = path.replacen("/0/", "/", 1);
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    match segments.as_slice() {
        [top] if !exclusions.contains(top) => Some(NormalizedEntry::flat(*top, value.clone())),
        [top, sub] if !exclusions.contains(sub) => {
            Some(NormalizedEntry::nested(*top, *sub, value.clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusions() -> ExclusionSet {
        ["Serial", "FirmwareVersion"].into_iter().collect()
    }

    fn one(path: &str, value: BusValue) -> Option<NormalizedEntry> {
        normalize_entry(path, &value, &exclusions())
    }

    #[test]
    fn test_index_segment_folded() {
        assert_eq!(
            one("/Dc/0/Voltage", BusValue::Float(52.1)),
            Some(NormalizedEntry::nested("Dc", "Voltage", BusValue::Float(52.1)))
        );
    }

    #[test]
    fn test_flat_key_passthrough() {
        assert_eq!(
            one("/Soc", BusValue::Integer(87)),
            Some(NormalizedEntry::flat("Soc", 87i64))
        );
    }

    #[test]
    fn test_two_segments_without_index() {
        assert_eq!(
            one("/Info/MaxChargeVoltage", BusValue::Float(56.0)),
            Some(NormalizedEntry::nested("Info", "MaxChargeVoltage", BusValue::Float(56.0)))
        );
    }

    #[test]
    fn test_only_first_index_removed() {
        // "/System/0/Cells/0/V" -> "/System/Cells/0/V": four segments
        assert_eq!(one("/System/0/Cells/0/V", BusValue::Float(3.3)), None);
    }

    #[test]
    fn test_deep_paths_skipped() {
        assert_eq!(one("/Io/Cells/3/Voltage", BusValue::Float(3.3)), None);
        assert_eq!(one("/Alarms/Cell/LowVoltage", BusValue::Integer(0)), None);
    }

    #[test]
    fn test_empty_segments_skipped() {
        assert_eq!(one("/", BusValue::Integer(1)), None);
        assert_eq!(one("", BusValue::Integer(1)), None);
        assert_eq!(one("/Dc//Power", BusValue::Integer(1)), None);
    }

    #[test]
    fn test_exclusion_on_last_segment() {
        assert_eq!(one("/Serial", BusValue::from("abc123")), None);
        assert_eq!(one("/Mgmt/FirmwareVersion", BusValue::from("1.2")), None);
        // Exclusions never apply to the top key of a nested path
        assert_eq!(
            one("/Serial/Number", BusValue::from("abc123")),
            Some(NormalizedEntry::nested("Serial", "Number", "abc123"))
        );
    }

    #[test]
    fn test_absent_values_dropped() {
        let snapshot: RawSnapshot = vec![
            ("/Dc/0/Power", Some(BusValue::Integer(100))),
            ("/Serial", Some(BusValue::from("abc123"))),
            ("/Soc", None),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            normalize(&snapshot, &exclusions()),
            vec![NormalizedEntry::nested("Dc", "Power", 100i64)]
        );
    }

    #[test]
    fn test_snapshot_order_preserved() {
        let snapshot: RawSnapshot = vec![
            ("/Soc", Some(BusValue::Integer(87))),
            ("/Dc/0/Voltage", Some(BusValue::Float(52.1))),
            ("/Capacity", Some(BusValue::Float(200.0))),
        ]
        .into_iter()
        .collect();

        let keys: Vec<String> = normalize(&snapshot, &ExclusionSet::new())
            .into_iter()
            .map(|e| e.top_key)
            .collect();
        assert_eq!(keys, vec!["Soc", "Dc", "Capacity"]);
    }
}
