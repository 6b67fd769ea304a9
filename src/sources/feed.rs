//! In-process push feed.
//!
//! Topic fan-out over tokio broadcast channels: publishers push into a
//! `(building, kind)` topic, subscribers get their own receiver. Slow
//! subscribers may lag and drop payloads, which is acceptable for live
//! telemetry. Used by the tests and by deployments where the measurement
//! stream is bridged into the process by other means.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::trace;

use super::{PushEvent, PushFeed, Subscription, TopicKind};

const TOPIC_CAPACITY: usize = 64;

#[derive(Default)]
pub struct InProcessFeed {
    topics: Mutex<HashMap<(String, TopicKind), broadcast::Sender<PushEvent>>>,
}

impl InProcessFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload to one topic. Payloads published while nobody is
    /// subscribed are dropped.
    pub fn publish(&self, building_id: &str, event: PushEvent) {
        let kind = match &event {
            PushEvent::Sample(_) => TopicKind::Measurement,
            PushEvent::Alert(_) => TopicKind::Alert,
        };

        let topics = self.topics.lock().expect("feed lock poisoned");
        if let Some(sender) = topics.get(&(building_id.to_string(), kind)) {
            match sender.send(event) {
                Ok(receivers) => trace!("published {kind:?} event to {receivers} receivers"),
                Err(_) => trace!("no receivers for {kind:?} event"),
            }
        }
    }
}

impl PushFeed for InProcessFeed {
    fn subscribe(&self, building_id: &str, kind: TopicKind) -> Subscription {
        let mut topics = self.topics.lock().expect("feed lock poisoned");
        let sender = topics
            .entry((building_id.to_string(), kind))
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);
        Subscription::new(sender.subscribe())
    }
}
