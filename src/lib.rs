pub mod actors;
pub mod alert_log;
pub mod classify;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod series;
pub mod sources;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Severity;

/// Atomic unit of the measurement stream: one tilt reading for one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Node identity (unique within a building)
    pub door_num: u32,

    /// When the reading was taken
    pub timestamp: DateTime<Utc>,

    /// Primary tilt axis (drives severity classification)
    pub axis_x: f64,

    /// Secondary tilt axis (display only)
    pub axis_y: f64,
}

/// One entry of the periodically polled liveness feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessRecord {
    /// Node identity
    pub door_num: u32,

    /// Node is transmitting
    pub alive: bool,

    /// Node has recording enabled (distinct from transmitting)
    pub recording: bool,

    /// Last time the backend heard from the node, if known
    pub last_seen: Option<DateTime<Utc>>,
}

/// Immutable entry of the alert log. This core only reads and groups these;
/// it never creates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub timestamp: DateTime<Utc>,
    pub door_num: u32,

    /// Name of the metric that crossed a breakpoint (e.g. "axis_x")
    pub metric: String,

    /// The measured value at the time of the alert
    pub value: f64,

    /// The breakpoint that was crossed
    pub threshold: f64,

    /// Severity band the value landed in
    pub severity: Severity,
}

/// Auxiliary environmental context, polled on a slow interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvSample {
    pub timestamp: DateTime<Utc>,

    /// Wind speed in m/s at the site
    pub wind_speed: f64,
}
