//! Two-level tree building and payload serialization.

use serde::ser::{Serialize, SerializeMap, Serializer};

use dbus_mqtt_common::{BusValue, Format, encode};

use crate::normalize::NormalizedEntry;

/// Value stored under a top key.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A scalar from a one-segment path.
    Value(BusValue),
    /// Sub keys from two-segment paths, in first-seen order.
    Group(Vec<(String, BusValue)>),
}

impl Node {
    fn set(&mut self, sub_key: &str, value: BusValue) {
        match self {
            Node::Group(entries) => match entries.iter().position(|(k, _)| k == sub_key) {
                Some(i) => entries[i].1 = value,
                None => entries.push((sub_key.to_string(), value)),
            },
            Node::Value(_) => *self = Node::Group(vec![(sub_key.to_string(), value)]),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Value(value) => value.serialize(serializer),
            Node::Group(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Nested mapping from top key to a scalar or a sub mapping.
///
/// Keys keep the order they were first seen in. Later writes to the same
/// key replace earlier ones; a scalar write replaces a sub mapping and a
/// keyed write replaces a scalar, but the top key keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedTree {
    nodes: Vec<(String, Node)>,
}

impl NestedTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold normalized entries into a tree.
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedEntry>,
    {
        let mut tree = Self::new();
        for entry in entries {
            tree.insert(entry);
        }
        tree
    }

    /// Apply a single entry.
    pub fn insert(&mut self, entry: &NormalizedEntry) {
        let position = self.nodes.iter().position(|(k, _)| *k == entry.top_key);

        match (position, &entry.sub_key) {
            (Some(i), None) => self.nodes[i].1 = Node::Value(entry.value.clone()),
            (Some(i), Some(sub)) => self.nodes[i].1.set(sub, entry.value.clone()),
            (None, None) => self
                .nodes
                .push((entry.top_key.clone(), Node::Value(entry.value.clone()))),
            (None, Some(sub)) => self.nodes.push((
                entry.top_key.clone(),
                Node::Group(vec![(sub.clone(), entry.value.clone())]),
            )),
        }
    }

    /// Look up a top key.
    pub fn get(&self, top_key: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|(k, _)| k == top_key)
            .map(|(_, node)| node)
    }

    /// Number of top keys.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no keys.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serialize to a payload.
    ///
    /// Output is deterministic: the same tree always yields the same bytes.
    pub fn serialize(&self, format: Format) -> dbus_mqtt_common::Result<Vec<u8>> {
        encode(self, format)
    }
}

impl Serialize for NestedTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for (key, node) in &self.nodes {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

/// Fold normalized entries into a tree.
pub fn build(entries: &[NormalizedEntry]) -> NestedTree {
    NestedTree::build(entries)
}
