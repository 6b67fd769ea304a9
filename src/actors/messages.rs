//! Message types for actor communication
//!
//! Commands are request/response messages sent to a specific actor via
//! mpsc; events are broadcast notifications fanned out to the rendering
//! layer. Event payloads are cloneable for the multi-subscriber pattern.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::EnvSample;
use crate::alert_log::AlertLogView;
use crate::classify::Severity;
use crate::config::ThresholdProfile;
use crate::error::EngineResult;
use crate::gateway::DisplayStatus;
use crate::registry::NodeRegistry;
use crate::series::{AggregationView, ViewKind};
use crate::LivenessRecord;

/// Commands accepted by the engine actor.
#[derive(Debug)]
pub enum EngineCommand {
    /// Tear down the current building state and rebuild it: baseline fetch,
    /// alert-log query, push-feed resubscription. The previous building's
    /// subscriptions are dropped.
    SelectBuilding {
        building_id: String,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },

    /// Replace the active threshold profile. Non-monotonic breakpoints are
    /// rejected and the prior profile is retained.
    SetThresholds {
        caution: f64,
        warning: f64,
        danger: f64,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },

    /// Select the observed node, time window and view kind. Triggers a
    /// historical query; a result superseded by a newer selection is
    /// discarded when it eventually arrives.
    SelectView {
        door_num: u32,
        kind: ViewKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    /// Force an immediate liveness poll, used after operator actions known
    /// to change liveness (e.g. toggling recording for a node).
    PollLivenessNow,

    /// Flip the expand/collapse flag of one alert group.
    ToggleAlertGroup { index: usize },

    /// Get the current derived display state.
    GetSnapshot {
        respond_to: oneshot::Sender<EngineSnapshot>,
    },

    /// Gracefully shut down the engine and its poller.
    Shutdown,
}

/// Per-node display state derived from the registry and the active profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStatus {
    pub door_num: u32,
    pub online: bool,
    pub recording: bool,
    pub severity: Severity,
}

/// Per-gateway display state.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStatus {
    pub serial_number: String,
    pub zone_label: String,
    pub status: DisplayStatus,
}

/// Read-only derived display state published to the rendering layer.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub building_id: Option<String>,

    /// Copy of the registry, for badge/detail rendering
    pub registry: NodeRegistry,

    pub thresholds: ThresholdProfile,
    pub node_statuses: Vec<NodeStatus>,
    pub gateway_statuses: Vec<GatewayStatus>,
    pub alert_log: AlertLogView,

    /// Identities of the currently most-tilted online nodes
    pub top_k: Vec<u32>,

    /// Latest environmental context, if any poll has succeeded
    pub wind: Option<EnvSample>,

    /// True when the displayed state is the last good one after a failed
    /// fetch ("stale data" indicator)
    pub stale: bool,
}

/// Events published on the engine's broadcast channel.
#[derive(Debug, Clone)]
pub enum ViewEvent {
    /// Registry or derived display state changed.
    SnapshotUpdated(EngineSnapshot),

    /// A historical query finished and its chart-ready view is available.
    ViewReady {
        door_num: u32,
        kind: ViewKind,
        view: AggregationView,
    },
}

/// Identity of a debounced recompute. Only one pending timer per topic may
/// exist at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecomputeTopic {
    /// Historical-range re-query for the chart of one node
    Chart { door_num: u32 },

    /// Liveness-driven recompute of display statuses
    Liveness,
}

/// Commands accepted by the liveness poller actor.
#[derive(Debug)]
pub enum PollerCommand {
    /// Poll immediately, bypassing the interval timer.
    PollNow,

    /// Gracefully shut down the poller.
    Shutdown,
}

/// Result of one liveness poll, delivered to the engine.
#[derive(Debug)]
pub struct LivenessUpdate {
    pub building_id: String,
    pub result: EngineResult<Vec<LivenessRecord>>,
}
