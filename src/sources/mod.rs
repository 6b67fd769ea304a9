//! External data interfaces consumed by the engine.
//!
//! The core never blocks on network I/O directly: each interface is an
//! async trait whose results arrive as discrete events, and the push feed
//! is a per-topic subscription handle. Everything here is read-only from
//! the core's perspective.

pub mod feed;
pub mod http;
pub mod wire;

pub use feed::InProcessFeed;
pub use http::HttpBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::config::ThresholdProfile;
use crate::error::EngineResult;
use crate::registry::{Gateway, Node};
use crate::{AlertLogEntry, EnvSample, LivenessRecord, Sample};

/// Everything a building selection needs in one shot: the full node and
/// gateway lists plus the operator-configured threshold profile.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub nodes: Vec<Node>,
    pub gateways: Vec<Gateway>,
    pub thresholds: ThresholdProfile,
}

/// One-shot baseline fetch per building selection. Re-invoked explicitly,
/// never polled.
#[async_trait]
pub trait BaselineSource: Send + Sync {
    async fn fetch_baseline(&self, building_id: &str) -> EngineResult<Baseline>;
}

/// Liveness/record-status feed, polled on a fixed interval.
#[async_trait]
pub trait LivenessSource: Send + Sync {
    async fn fetch_liveness(&self, building_id: &str) -> EngineResult<Vec<LivenessRecord>>;
}

/// Historical-range query, invoked on time-window/view-mode changes and on
/// debounced stream-triggered refresh. Returns samples in ascending
/// timestamp order.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn query_range(
        &self,
        door_num: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<Sample>>;
}

/// Alert log query, invoked once per building selection; subsequent entries
/// arrive over the push feed.
#[async_trait]
pub trait AlertLogSource: Send + Sync {
    async fn query_alerts(
        &self,
        building_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<AlertLogEntry>>;
}

/// Auxiliary environmental context, polled on a slow interval.
#[async_trait]
pub trait EnvSource: Send + Sync {
    async fn fetch_env(&self, building_id: &str) -> EngineResult<EnvSample>;
}

/// Payload kinds delivered over the push feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Measurement,
    Alert,
}

/// One payload from the push feed.
#[derive(Debug, Clone)]
pub enum PushEvent {
    Sample(Sample),
    Alert(AlertLogEntry),
}

/// Push feed keyed by `(building, kind)` topic. Dropping the returned
/// [`Subscription`] unsubscribes, which is how the engine avoids leaking
/// listeners across building changes.
pub trait PushFeed: Send + Sync {
    fn subscribe(&self, building_id: &str, kind: TopicKind) -> Subscription;
}

/// Handle to one push-feed topic.
pub struct Subscription {
    receiver: broadcast::Receiver<PushEvent>,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<PushEvent>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> Result<PushEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}
