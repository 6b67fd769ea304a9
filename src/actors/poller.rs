//! LivenessPollerActor - polls the liveness feed on a fixed interval
//!
//! The poller runs independently of stream activity: it ticks at the
//! configured interval, fetches the liveness snapshot for the currently
//! viewed building, and hands the result to the engine. The engine can also
//! demand an immediate poll after an operator action known to change
//! liveness, so the dashboard never displays stale state after a
//! known-causal change.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{LivenessUpdate, PollerCommand};
use crate::sources::LivenessSource;

/// Actor that polls the liveness feed for the currently viewed building.
pub struct LivenessPollerActor {
    source: Arc<dyn LivenessSource>,

    /// Currently viewed building, updated by the engine
    building_rx: watch::Receiver<Option<String>>,

    command_rx: mpsc::Receiver<PollerCommand>,

    /// Poll results, consumed by the engine
    update_tx: mpsc::Sender<LivenessUpdate>,

    interval_duration: Duration,
}

impl LivenessPollerActor {
    pub fn new(
        source: Arc<dyn LivenessSource>,
        building_rx: watch::Receiver<Option<String>>,
        command_rx: mpsc::Receiver<PollerCommand>,
        update_tx: mpsc::Sender<LivenessUpdate>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            source,
            building_rx,
            command_rx,
            update_tx,
            interval_duration,
        }
    }

    /// Run the actor's main loop until shutdown or channel closure.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting liveness poller");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow => {
                            trace!("received PollNow command");
                            self.poll().await;
                        }

                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("liveness poller stopped");
    }

    /// Poll once for the currently viewed building. Fetch failures are
    /// reported to the engine (which keeps the last-known state and retries
    /// on the next tick), never fatal here.
    async fn poll(&mut self) {
        let Some(building_id) = self.building_rx.borrow().clone() else {
            trace!("no building selected, skipping liveness poll");
            return;
        };

        let result = self.source.fetch_liveness(&building_id).await;
        if let Err(e) = &result {
            error!("liveness poll for {building_id} failed: {e}");
        }

        let update = LivenessUpdate {
            building_id,
            result,
        };
        if self.update_tx.send(update).await.is_err() {
            warn!("engine is gone, dropping liveness update");
        }
    }
}

/// Handle for controlling a [`LivenessPollerActor`].
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl PollerHandle {
    /// Spawn a poller as a tokio task and return its handle.
    pub fn spawn(
        source: Arc<dyn LivenessSource>,
        building_rx: watch::Receiver<Option<String>>,
        update_tx: mpsc::Sender<LivenessUpdate>,
        interval_duration: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor =
            LivenessPollerActor::new(source, building_rx, cmd_rx, update_tx, interval_duration);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Poll immediately, bypassing the interval timer.
    pub async fn poll_now(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::PollNow)
            .await
            .context("failed to send PollNow command")
    }

    /// Gracefully shut down the poller.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::LivenessRecord;
    use crate::error::{EngineError, EngineResult};

    struct StaticLiveness {
        records: Vec<LivenessRecord>,
        fail: bool,
    }

    #[async_trait]
    impl LivenessSource for StaticLiveness {
        async fn fetch_liveness(&self, _building_id: &str) -> EngineResult<Vec<LivenessRecord>> {
            if self.fail {
                Err(EngineError::FetchFailed("backend down".to_string()))
            } else {
                Ok(self.records.clone())
            }
        }
    }

    fn record(door_num: u32) -> LivenessRecord {
        LivenessRecord {
            door_num,
            alive: true,
            recording: true,
            last_seen: None,
        }
    }

    #[tokio::test]
    async fn poll_now_delivers_an_update() {
        let source = Arc::new(StaticLiveness {
            records: vec![record(1), record(2)],
            fail: false,
        });
        let (_building_tx, building_rx) = watch::channel(Some("b-1".to_string()));
        let (update_tx, mut update_rx) = mpsc::channel(8);

        let handle = PollerHandle::spawn(source, building_rx, update_tx, Duration::from_secs(3600));

        handle.poll_now().await.unwrap();
        let update = update_rx.recv().await.unwrap();
        assert_eq!(update.building_id, "b-1");
        assert_eq!(update.result.unwrap().len(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn no_building_means_no_update() {
        let source = Arc::new(StaticLiveness {
            records: vec![record(1)],
            fail: false,
        });
        let (_building_tx, building_rx) = watch::channel(None);
        let (update_tx, mut update_rx) = mpsc::channel(8);

        let handle = PollerHandle::spawn(source, building_rx, update_tx, Duration::from_secs(3600));
        handle.poll_now().await.unwrap();

        let waited =
            tokio::time::timeout(Duration::from_millis(50), update_rx.recv()).await;
        assert!(waited.is_err());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn fetch_failure_is_delivered_not_swallowed() {
        let source = Arc::new(StaticLiveness {
            records: vec![],
            fail: true,
        });
        let (_building_tx, building_rx) = watch::channel(Some("b-1".to_string()));
        let (update_tx, mut update_rx) = mpsc::channel(8);

        let handle = PollerHandle::spawn(source, building_rx, update_tx, Duration::from_secs(3600));
        handle.poll_now().await.unwrap();

        let update = update_rx.recv().await.unwrap();
        assert!(update.result.is_err());

        handle.shutdown().await.unwrap();
    }
}
