//! Gateway display status, aggregated from member node severities.

use serde::{Deserialize, Serialize};

use crate::classify::{Severity, classify};
use crate::config::ThresholdProfile;
use crate::registry::{Gateway, NodeRegistry};

/// What the monitoring screen shows for a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum DisplayStatus {
    /// The gateway itself reports dead; member state is irrelevant.
    Down,

    /// Alive, but no member node is currently online.
    Idle,

    /// Worst severity among online members, plus the node that carried it.
    Active {
        severity: Severity,
        worst_node: u32,
    },
}

/// Derive a gateway's display status.
///
/// Members are visited in ascending `door_num` order and the worst severity
/// is replaced only on a strictly more severe classification, so ties at
/// the worst severity deterministically pick the lowest node identity.
pub fn gateway_status(
    gateway: &Gateway,
    registry: &NodeRegistry,
    profile: &ThresholdProfile,
) -> DisplayStatus {
    if !gateway.alive {
        return DisplayStatus::Down;
    }

    let mut worst: Option<(Severity, u32)> = None;

    for &door_num in &gateway.members {
        let Some(node) = registry.node(door_num) else {
            continue;
        };
        if !node.online {
            continue;
        }

        let severity = classify(node.axis_x, profile);
        match worst {
            None => worst = Some((severity, door_num)),
            Some((current, _)) if severity > current => worst = Some((severity, door_num)),
            _ => {}
        }
    }

    match worst {
        None => DisplayStatus::Idle,
        Some((severity, worst_node)) => DisplayStatus::Active {
            severity,
            worst_node,
        },
    }
}
