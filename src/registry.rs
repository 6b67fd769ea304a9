//! In-memory node/gateway registry for the currently viewed building.
//!
//! The registry is rebuilt wholesale whenever a baseline re-fetch completes
//! (full replace, never a merge of deletions) and incrementally patched in
//! between by streamed samples and liveness-poll results. One instance is
//! scoped to the active building and torn down on building change.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{LivenessRecord, Sample};

/// One tilt-sensor node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identity (unique within a building)
    pub door_num: u32,

    /// Latest primary axis reading
    pub axis_x: f64,

    /// Latest secondary axis reading
    pub axis_y: f64,

    /// Optional human-readable position label
    #[serde(default)]
    pub position: String,

    /// Owning gateway, if assigned
    pub gateway_id: Option<String>,

    /// Derived: transmitting AND recording (liveness merge)
    #[serde(default)]
    pub online: bool,

    /// Derived: recording enabled (shown in the detail view)
    #[serde(default)]
    pub recording: bool,

    pub last_updated_at: Option<DateTime<Utc>>,
}

/// One gateway and its member nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    /// Gateway identity
    pub serial_number: String,

    /// Human-readable zone label, may be empty
    #[serde(default)]
    pub zone_label: String,

    /// Gateway's own liveness flag, independent of member node liveness
    pub alive: bool,

    /// Member node identities, kept in ascending order
    #[serde(default)]
    pub members: BTreeSet<u32>,
}

/// In-memory table of node identities and their last-known measurement,
/// merged from a one-shot baseline fetch plus continuous stream updates.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<u32, Node>,
    gateways: BTreeMap<String, Gateway>,

    /// Set when the most recent fetch feeding this registry failed and the
    /// displayed state is the last good one.
    stale: bool,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full node and gateway set. No stale entries survive;
    /// gateway membership is rebuilt from the nodes' `gateway_id` fields so
    /// there is a single source of truth for membership.
    pub fn load_baseline(&mut self, nodes: Vec<Node>, gateways: Vec<Gateway>) {
        self.nodes = nodes.into_iter().map(|n| (n.door_num, n)).collect();
        self.gateways = gateways
            .into_iter()
            .map(|mut g| {
                g.members.clear();
                (g.serial_number.clone(), g)
            })
            .collect();

        for node in self.nodes.values() {
            if let Some(gateway_id) = &node.gateway_id
                && let Some(gateway) = self.gateways.get_mut(gateway_id)
            {
                gateway.members.insert(node.door_num);
            }
        }

        self.stale = false;
        trace!(
            "baseline loaded: {} nodes, {} gateways",
            self.nodes.len(),
            self.gateways.len()
        );
    }

    /// Apply a streamed sample: last-write-wins overwrite of the stored
    /// measurement, with no timestamp comparison against the existing value.
    /// The live feed is trusted to represent current reality, so a sample
    /// for a node absent from the last baseline inserts a fresh node
    /// (hardware added between polls).
    pub fn apply_sample(&mut self, sample: &Sample) {
        match self.nodes.get_mut(&sample.door_num) {
            Some(node) => {
                node.axis_x = sample.axis_x;
                node.axis_y = sample.axis_y;
                node.last_updated_at = Some(sample.timestamp);
            }
            None => {
                trace!("sample for unknown node {}, inserting", sample.door_num);
                self.nodes.insert(
                    sample.door_num,
                    Node {
                        door_num: sample.door_num,
                        axis_x: sample.axis_x,
                        axis_y: sample.axis_y,
                        position: String::new(),
                        gateway_id: None,
                        online: true,
                        recording: false,
                        last_updated_at: Some(sample.timestamp),
                    },
                );
            }
        }
    }

    /// Merge a liveness snapshot over every registry node.
    ///
    /// `online` requires both flags: a node transmitting but not recording
    /// is shown offline. Nodes absent from the snapshot default to offline
    /// and not recording. Records for node ids not in the registry are
    /// ignored.
    pub fn apply_liveness(&mut self, records: &[LivenessRecord]) {
        let by_id: HashMap<u32, &LivenessRecord> =
            records.iter().map(|r| (r.door_num, r)).collect();

        for node in self.nodes.values_mut() {
            match by_id.get(&node.door_num) {
                Some(record) => {
                    node.online = record.alive && record.recording;
                    node.recording = record.recording;
                    if let Some(last_seen) = record.last_seen {
                        node.last_updated_at = Some(last_seen);
                    }
                }
                None => {
                    node.online = false;
                    node.recording = false;
                }
            }
        }
    }

    pub fn node(&self, door_num: u32) -> Option<&Node> {
        self.nodes.get(&door_num)
    }

    /// Nodes in ascending `door_num` order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn gateway(&self, serial_number: &str) -> Option<&Gateway> {
        self.gateways.get(serial_number)
    }

    /// Gateways in ascending serial order.
    pub fn gateways(&self) -> impl Iterator<Item = &Gateway> {
        self.gateways.values()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self, stale: bool) {
        self.stale = stale;
    }

    /// Cheap copy for derived-view computation outside the engine actor.
    pub fn snapshot(&self) -> NodeRegistry {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn node(door_num: u32, gateway_id: Option<&str>) -> Node {
        Node {
            door_num,
            axis_x: 0.0,
            axis_y: 0.0,
            position: String::new(),
            gateway_id: gateway_id.map(String::from),
            online: false,
            recording: false,
            last_updated_at: None,
        }
    }

    fn gateway(serial: &str) -> Gateway {
        Gateway {
            serial_number: serial.to_string(),
            zone_label: String::new(),
            alive: true,
            members: BTreeSet::new(),
        }
    }

    fn sample(door_num: u32, axis_x: f64) -> Sample {
        Sample {
            door_num,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            axis_x,
            axis_y: 0.0,
        }
    }

    #[test]
    fn baseline_replaces_everything() {
        let mut registry = NodeRegistry::new();
        registry.load_baseline(vec![node(1, None), node(2, None)], vec![]);
        assert_eq!(registry.node_count(), 2);

        registry.load_baseline(vec![node(3, None)], vec![]);
        assert_eq!(registry.node_count(), 1);
        assert!(registry.node(1).is_none());
        assert!(registry.node(3).is_some());
    }

    #[test]
    fn baseline_rebuilds_gateway_membership() {
        let mut registry = NodeRegistry::new();
        let mut stale_gateway = gateway("gw-1");
        stale_gateway.members.insert(99); // must not survive the rebuild

        registry.load_baseline(
            vec![node(1, Some("gw-1")), node(2, Some("gw-1")), node(3, None)],
            vec![stale_gateway],
        );

        let members = &registry.gateway("gw-1").unwrap().members;
        assert_eq!(members.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn sample_overwrites_without_timestamp_check() {
        let mut registry = NodeRegistry::new();
        registry.load_baseline(vec![node(1, None)], vec![]);

        registry.apply_sample(&sample(1, 0.5));
        assert_eq!(registry.node(1).unwrap().axis_x, 0.5);

        // an "older" sample still wins, there is no timestamp comparison
        let older = Sample {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap(),
            ..sample(1, 0.2)
        };
        registry.apply_sample(&older);
        assert_eq!(registry.node(1).unwrap().axis_x, 0.2);
        assert_eq!(registry.node(1).unwrap().last_updated_at, Some(older.timestamp));
    }

    #[test]
    fn sample_for_unknown_node_inserts_online_node() {
        let mut registry = NodeRegistry::new();
        registry.apply_sample(&sample(7, 0.3));

        let inserted = registry.node(7).unwrap();
        assert!(inserted.online);
        assert_eq!(inserted.position, "");
        assert_eq!(inserted.axis_x, 0.3);
        assert!(inserted.gateway_id.is_none());
    }

    #[test]
    fn liveness_requires_both_flags() {
        let mut registry = NodeRegistry::new();
        registry.load_baseline(vec![node(1, None), node(2, None), node(3, None)], vec![]);

        registry.apply_liveness(&[
            LivenessRecord {
                door_num: 1,
                alive: true,
                recording: true,
                last_seen: None,
            },
            LivenessRecord {
                door_num: 2,
                alive: true,
                recording: false,
                last_seen: None,
            },
        ]);

        assert!(registry.node(1).unwrap().online);
        assert!(!registry.node(2).unwrap().online); // transmitting but not recording
        assert!(!registry.node(2).unwrap().recording);
        // absent from the snapshot -> offline
        assert!(!registry.node(3).unwrap().online);
        assert!(!registry.node(3).unwrap().recording);
    }

    #[test]
    fn liveness_for_unknown_node_is_ignored() {
        let mut registry = NodeRegistry::new();
        registry.load_baseline(vec![node(1, None)], vec![]);

        registry.apply_liveness(&[LivenessRecord {
            door_num: 42,
            alive: true,
            recording: true,
            last_seen: None,
        }]);

        assert!(registry.node(42).is_none());
        assert_eq!(registry.node_count(), 1);
    }

    #[test]
    fn liveness_resets_previous_online_state() {
        let mut registry = NodeRegistry::new();
        registry.load_baseline(vec![node(1, None)], vec![]);

        registry.apply_liveness(&[LivenessRecord {
            door_num: 1,
            alive: true,
            recording: true,
            last_seen: None,
        }]);
        assert!(registry.node(1).unwrap().online);

        // next snapshot no longer contains the node
        registry.apply_liveness(&[]);
        assert!(!registry.node(1).unwrap().online);
    }
}
