//! EngineActor - owns the registry and drives all recomputation
//!
//! The engine is the single writer of the in-memory node/gateway state. It
//! is driven by three independent async sources:
//!
//! 1. the push feed (samples and alert entries, bursty),
//! 2. fixed-interval polls (liveness via the poller actor, wind context),
//! 3. on-demand historical-range queries triggered by user selection.
//!
//! Stream samples are applied to the registry immediately for display, but
//! the expensive historical re-query behind the charts is coalesced by a
//! per-topic debounce timer: the first event arms the timer, later events
//! within the window are absorbed. Historical queries run off-actor and
//! carry a generation tag; a response superseded by a newer selection or
//! building change is discarded instead of overwriting newer state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{
    EngineCommand, EngineSnapshot, GatewayStatus, LivenessUpdate, NodeStatus, RecomputeTopic,
    ViewEvent,
};
use super::poller::PollerHandle;
use crate::alert_log::AlertLogView;
use crate::classify::classify;
use crate::config::{ThresholdProfile, TimingConfig};
use crate::error::{EngineError, EngineResult};
use crate::gateway::gateway_status;
use crate::registry::NodeRegistry;
use crate::series::{self, AggregationView, NodeSeries, ViewKind};
use crate::sources::{
    AlertLogSource, BaselineSource, EnvSource, HistorySource, LivenessSource, PushEvent, PushFeed,
    TopicKind,
};
use crate::{EnvSample, Sample};

/// The external collaborators an engine is wired against.
#[derive(Clone)]
pub struct EngineSources {
    pub baseline: Arc<dyn BaselineSource>,
    pub liveness: Arc<dyn LivenessSource>,
    pub history: Arc<dyn HistorySource>,
    pub alerts: Arc<dyn AlertLogSource>,
    pub env: Arc<dyn EnvSource>,
    pub feed: Arc<dyn PushFeed>,
}

/// The currently observed node / time window / view mode.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewSelection {
    door_num: u32,
    kind: ViewKind,
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
}

/// Messages the engine sends itself from spawned tasks.
enum Internal {
    Push(PushEvent),
    RecomputeDue(RecomputeTopic),
    HistoryResult {
        generation: u64,
        door_num: u32,
        kind: ViewKind,
        result: EngineResult<Vec<Sample>>,
    },
    TopKResult {
        generation: u64,
        door_num: u32,
        result: EngineResult<Vec<NodeSeries>>,
    },
    Env(EngineResult<EnvSample>),
}

pub struct EngineActor {
    sources: EngineSources,
    timing: TimingConfig,

    command_rx: mpsc::Receiver<EngineCommand>,
    event_tx: broadcast::Sender<ViewEvent>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,

    /// Tells the poller which building to poll
    building_tx: watch::Sender<Option<String>>,
    poller: PollerHandle,
    liveness_rx: mpsc::Receiver<LivenessUpdate>,

    building_id: Option<String>,
    registry: NodeRegistry,
    thresholds: ThresholdProfile,
    alert_log: AlertLogView,
    selection: Option<ViewSelection>,

    /// Stale-response guard for historical queries: bumped on every
    /// selection or building change, stamped onto each outgoing query
    generation: u64,

    /// Debounce timers currently armed, one per topic
    pending: HashSet<RecomputeTopic>,

    wind: Option<EnvSample>,

    /// Push-feed forwarder tasks for the current building; aborted on
    /// building change so no listener leaks across selections
    forwarders: Vec<JoinHandle<()>>,
}

impl EngineActor {
    /// Run the actor's main loop until shutdown or channel closure.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting engine actor");

        let mut env_ticker = interval(Duration::from_secs(self.timing.wind_interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = env_ticker.tick() => {
                    self.spawn_env_fetch();
                }

                Some(update) = self.liveness_rx.recv() => {
                    self.handle_liveness(update);
                }

                Some(internal) = self.internal_rx.recv() => {
                    self.handle_internal(internal);
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.drop_subscriptions();
        if let Err(e) = self.poller.shutdown().await {
            trace!("poller already stopped: {e:#}");
        }
        debug!("engine actor stopped");
    }

    /// Handle a command. Returns false when the actor should stop.
    async fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::SelectBuilding {
                building_id,
                respond_to,
            } => {
                let result = self.select_building(building_id).await;
                let _ = respond_to.send(result);
            }

            EngineCommand::SetThresholds {
                caution,
                warning,
                danger,
                respond_to,
            } => {
                // rejected profiles leave the prior one in place
                let result = ThresholdProfile::new(caution, warning, danger).map(|profile| {
                    self.thresholds = profile;
                    self.publish_snapshot();
                });
                let _ = respond_to.send(result);
            }

            EngineCommand::SelectView {
                door_num,
                kind,
                from,
                to,
            } => {
                // supersede any in-flight query for the previous selection
                self.generation += 1;
                let selection = ViewSelection {
                    door_num,
                    kind,
                    from,
                    to,
                };
                self.selection = Some(selection);
                self.spawn_history_query(selection);
            }

            EngineCommand::PollLivenessNow => {
                if let Err(e) = self.poller.poll_now().await {
                    warn!("could not trigger liveness poll: {e:#}");
                }
            }

            EngineCommand::ToggleAlertGroup { index } => {
                self.alert_log.toggle(index);
                self.publish_snapshot();
            }

            EngineCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.build_snapshot());
            }

            EngineCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }

        true
    }

    /// Tear down the current building state and rebuild it from a fresh
    /// baseline. On baseline failure the previous state is retained with
    /// the staleness indicator set, and the caller must re-invoke; there is
    /// no automatic baseline retry.
    #[instrument(skip(self))]
    async fn select_building(&mut self, building_id: String) -> EngineResult<()> {
        debug!("selecting building {building_id}");

        self.drop_subscriptions();
        self.generation += 1;
        self.selection = None;

        let baseline = match self.sources.baseline.fetch_baseline(&building_id).await {
            Ok(baseline) => baseline,
            Err(e) => {
                error!("baseline fetch for {building_id} failed: {e}");
                self.registry.mark_stale(true);
                self.publish_snapshot();
                return Err(e);
            }
        };

        self.registry = NodeRegistry::new();
        self.registry
            .load_baseline(baseline.nodes, baseline.gateways);
        self.thresholds = baseline.thresholds;
        self.wind = None;

        match self
            .sources
            .alerts
            .query_alerts(&building_id, self.timing.alert_log_limit)
            .await
        {
            Ok(entries) => self.alert_log = AlertLogView::from_entries(entries),
            Err(e) => {
                // an empty log beats showing the previous building's entries
                warn!("alert log query for {building_id} failed: {e}");
                self.alert_log = AlertLogView::default();
                self.registry.mark_stale(true);
            }
        }

        self.subscribe_topics(&building_id);
        let _ = self.building_tx.send(Some(building_id.clone()));
        self.building_id = Some(building_id);

        // building selection is a known-causal liveness change
        if let Err(e) = self.poller.poll_now().await {
            warn!("could not trigger liveness poll: {e:#}");
        }
        self.spawn_env_fetch();

        self.publish_snapshot();
        Ok(())
    }

    /// Spawn forwarder tasks that pump the building's push topics into the
    /// engine's internal channel.
    fn subscribe_topics(&mut self, building_id: &str) {
        for kind in [TopicKind::Measurement, TopicKind::Alert] {
            let mut subscription = self.sources.feed.subscribe(building_id, kind);
            let internal_tx = self.internal_tx.clone();

            self.forwarders.push(tokio::spawn(async move {
                loop {
                    match subscription.recv().await {
                        Ok(event) => {
                            if internal_tx.send(Internal::Push(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("push feed lagged, skipped {skipped} payloads");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }
    }

    fn drop_subscriptions(&mut self) {
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Push(PushEvent::Sample(sample)) => {
                self.registry.apply_sample(&sample);
                // cheap derived state (statuses, top-k) updates immediately
                self.publish_snapshot();

                // the expensive historical re-query behind the chart is
                // debounced. A top-k selection is affected by any sample
                // (the ranking may shift); single-node views only by their
                // own node's samples.
                if let Some(selection) = self.selection
                    && (selection.kind == ViewKind::TopK
                        || selection.door_num == sample.door_num)
                {
                    self.schedule_recompute(RecomputeTopic::Chart {
                        door_num: selection.door_num,
                    });
                }
            }

            Internal::Push(PushEvent::Alert(entry)) => {
                trace!("streamed alert for node {}", entry.door_num);
                self.alert_log.push_entry(entry);
                self.publish_snapshot();
            }

            Internal::RecomputeDue(topic) => {
                self.pending.remove(&topic);
                match topic {
                    RecomputeTopic::Chart { door_num } => {
                        if let Some(selection) = self.selection
                            && selection.door_num == door_num
                        {
                            self.spawn_history_query(selection);
                        }
                    }
                    RecomputeTopic::Liveness => self.publish_snapshot(),
                }
            }

            Internal::HistoryResult {
                generation,
                door_num,
                kind,
                result,
            } => {
                if generation != self.generation {
                    trace!("discarding stale history response for node {door_num}");
                    return;
                }
                match result {
                    Ok(samples) => {
                        let view = match kind {
                            ViewKind::Raw => AggregationView::Raw(series::raw_series(&samples)),
                            ViewKind::Delta => {
                                AggregationView::Delta(series::delta_series(&samples))
                            }
                            ViewKind::AvgDelta => {
                                AggregationView::AvgDelta(series::avg_delta_series(&samples))
                            }
                            // ranked views arrive as TopKResult, never here
                            ViewKind::TopK => return,
                        };
                        let _ = self.event_tx.send(ViewEvent::ViewReady {
                            door_num,
                            kind,
                            view,
                        });
                    }
                    Err(e) => {
                        error!("history query for node {door_num} failed: {e}");
                        self.registry.mark_stale(true);
                        self.publish_snapshot();
                    }
                }
            }

            Internal::TopKResult {
                generation,
                door_num,
                result,
            } => {
                if generation != self.generation {
                    trace!("discarding stale ranked-series response");
                    return;
                }
                match result {
                    Ok(series_set) => {
                        let _ = self.event_tx.send(ViewEvent::ViewReady {
                            door_num,
                            kind: ViewKind::TopK,
                            view: AggregationView::TopK(series_set),
                        });
                    }
                    Err(e) => {
                        error!("ranked-series query failed: {e}");
                        self.registry.mark_stale(true);
                        self.publish_snapshot();
                    }
                }
            }

            Internal::Env(result) => match result {
                Ok(sample) => {
                    self.wind = Some(sample);
                    self.publish_snapshot();
                }
                Err(e) => warn!("environment poll failed: {e}"),
            },
        }
    }

    fn handle_liveness(&mut self, update: LivenessUpdate) {
        if self.building_id.as_deref() != Some(update.building_id.as_str()) {
            trace!("discarding liveness snapshot for {}", update.building_id);
            return;
        }

        match update.result {
            Ok(records) => {
                self.registry.apply_liveness(&records);
                self.registry.mark_stale(false);
                self.schedule_recompute(RecomputeTopic::Liveness);
            }
            Err(_) => {
                // already logged by the poller; keep last-known state and
                // retry on the next scheduled tick
                self.registry.mark_stale(true);
                self.publish_snapshot();
            }
        }
    }

    /// Arm the debounce timer for a topic. A new event while a timer is
    /// pending neither resets nor duplicates it.
    fn schedule_recompute(&mut self, topic: RecomputeTopic) {
        if !self.pending.insert(topic) {
            return;
        }

        let delay = match topic {
            RecomputeTopic::Chart { .. } => Duration::from_millis(self.timing.chart_debounce_ms),
            RecomputeTopic::Liveness => Duration::from_millis(self.timing.liveness_debounce_ms),
        };

        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal_tx.send(Internal::RecomputeDue(topic)).await;
        });
    }

    fn spawn_history_query(&self, selection: ViewSelection) {
        if selection.kind == ViewKind::TopK {
            self.spawn_top_k_query(selection);
            return;
        }

        let generation = self.generation;
        let history = self.sources.history.clone();
        let internal_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let result = history
                .query_range(selection.door_num, selection.from, selection.to)
                .await;
            let _ = internal_tx
                .send(Internal::HistoryResult {
                    generation,
                    door_num: selection.door_num,
                    kind: selection.kind,
                    result,
                })
                .await;
        });
    }

    /// Fan out range queries for the currently ranked node set and deliver
    /// their joint series. The ranking is taken from the registry at spawn
    /// time; the generation guard discards the result if the selection or
    /// building changes while the queries run.
    fn spawn_top_k_query(&self, selection: ViewSelection) {
        let generation = self.generation;
        let ranked = series::top_k(&self.registry);
        let history = self.sources.history.clone();
        let internal_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let queries = ranked.into_iter().map(|door_num| {
                let history = history.clone();
                async move {
                    history
                        .query_range(door_num, selection.from, selection.to)
                        .await
                        .map(|samples| NodeSeries {
                            door_num,
                            points: series::axis_series(&samples),
                        })
                }
            });
            let result = join_all(queries).await.into_iter().collect();
            let _ = internal_tx
                .send(Internal::TopKResult {
                    generation,
                    door_num: selection.door_num,
                    result,
                })
                .await;
        });
    }

    fn spawn_env_fetch(&self) {
        let Some(building_id) = self.building_id.clone() else {
            return;
        };
        let env = self.sources.env.clone();
        let internal_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let result = env.fetch_env(&building_id).await;
            let _ = internal_tx.send(Internal::Env(result)).await;
        });
    }

    /// Derive the full display state from a registry snapshot. Pure and
    /// performed outside any lock; mutation cost inside the actor stays
    /// O(1) per event.
    fn build_snapshot(&self) -> EngineSnapshot {
        let registry = self.registry.snapshot();

        let node_statuses = registry
            .nodes()
            .map(|node| NodeStatus {
                door_num: node.door_num,
                online: node.online,
                recording: node.recording,
                severity: classify(node.axis_x, &self.thresholds),
            })
            .collect();

        let gateway_statuses = registry
            .gateways()
            .map(|gateway| GatewayStatus {
                serial_number: gateway.serial_number.clone(),
                zone_label: gateway.zone_label.clone(),
                status: gateway_status(gateway, &registry, &self.thresholds),
            })
            .collect();

        EngineSnapshot {
            building_id: self.building_id.clone(),
            thresholds: self.thresholds,
            node_statuses,
            gateway_statuses,
            alert_log: self.alert_log.clone(),
            top_k: series::top_k(&registry),
            wind: self.wind,
            stale: registry.is_stale(),
            registry,
        }
    }

    fn publish_snapshot(&self) {
        let _ = self
            .event_tx
            .send(ViewEvent::SnapshotUpdated(self.build_snapshot()));
    }
}

/// Handle for controlling an [`EngineActor`]. Can be cloned and shared.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
    event_tx: broadcast::Sender<ViewEvent>,
}

impl EngineHandle {
    /// Spawn an engine (and its liveness poller) and return the handle.
    pub fn spawn(sources: EngineSources, timing: TimingConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(64);
        let (internal_tx, internal_rx) = mpsc::channel(256);
        let (building_tx, building_rx) = watch::channel(None);
        let (liveness_tx, liveness_rx) = mpsc::channel(8);

        let poller = PollerHandle::spawn(
            sources.liveness.clone(),
            building_rx,
            liveness_tx,
            Duration::from_secs(timing.liveness_interval_secs.max(1)),
        );

        let actor = EngineActor {
            sources,
            timing,
            command_rx: cmd_rx,
            event_tx: event_tx.clone(),
            internal_tx,
            internal_rx,
            building_tx,
            poller,
            liveness_rx,
            building_id: None,
            registry: NodeRegistry::new(),
            thresholds: ThresholdProfile::disabled(),
            alert_log: AlertLogView::default(),
            selection: None,
            generation: 0,
            pending: HashSet::new(),
            wind: None,
            forwarders: Vec::new(),
        };

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
        }
    }

    /// Subscribe to snapshot and chart-ready view events.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.event_tx.subscribe()
    }

    pub async fn select_building(&self, building_id: &str) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::SelectBuilding {
                building_id: building_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| EngineError::EngineClosed)?;
        rx.await.map_err(|_| EngineError::EngineClosed)?
    }

    pub async fn set_thresholds(
        &self,
        caution: f64,
        warning: f64,
        danger: f64,
    ) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::SetThresholds {
                caution,
                warning,
                danger,
                respond_to: tx,
            })
            .await
            .map_err(|_| EngineError::EngineClosed)?;
        rx.await.map_err(|_| EngineError::EngineClosed)?
    }

    pub async fn select_view(
        &self,
        door_num: u32,
        kind: ViewKind,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<()> {
        self.sender
            .send(EngineCommand::SelectView {
                door_num,
                kind,
                from,
                to,
            })
            .await
            .map_err(|_| EngineError::EngineClosed)
    }

    /// Trigger an immediate liveness poll.
    pub async fn poll_liveness_now(&self) -> EngineResult<()> {
        self.sender
            .send(EngineCommand::PollLivenessNow)
            .await
            .map_err(|_| EngineError::EngineClosed)
    }

    pub async fn toggle_alert_group(&self, index: usize) -> EngineResult<()> {
        self.sender
            .send(EngineCommand::ToggleAlertGroup { index })
            .await
            .map_err(|_| EngineError::EngineClosed)
    }

    pub async fn snapshot(&self) -> EngineResult<EngineSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::GetSnapshot { respond_to: tx })
            .await
            .map_err(|_| EngineError::EngineClosed)?;
        rx.await.map_err(|_| EngineError::EngineClosed)
    }

    /// Gracefully shut down the engine and its poller.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(EngineCommand::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::sources::{Baseline, Subscription};
    use crate::{AlertLogEntry, LivenessRecord};

    /// Backend with no data, used for wiring-level tests. The fuller
    /// scenarios live in tests/engine_tests.rs.
    struct EmptyBackend;

    #[async_trait]
    impl BaselineSource for EmptyBackend {
        async fn fetch_baseline(&self, _building_id: &str) -> EngineResult<Baseline> {
            Ok(Baseline {
                nodes: vec![],
                gateways: vec![],
                thresholds: ThresholdProfile::new(0.2, 0.4, 0.6)?,
            })
        }
    }

    #[async_trait]
    impl LivenessSource for EmptyBackend {
        async fn fetch_liveness(&self, _building_id: &str) -> EngineResult<Vec<LivenessRecord>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl HistorySource for EmptyBackend {
        async fn query_range(
            &self,
            _door_num: u32,
            _from: chrono::DateTime<chrono::Utc>,
            _to: chrono::DateTime<chrono::Utc>,
        ) -> EngineResult<Vec<Sample>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl AlertLogSource for EmptyBackend {
        async fn query_alerts(
            &self,
            _building_id: &str,
            _limit: usize,
        ) -> EngineResult<Vec<AlertLogEntry>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl EnvSource for EmptyBackend {
        async fn fetch_env(&self, _building_id: &str) -> EngineResult<EnvSample> {
            Err(EngineError::FetchFailed("no environment data".to_string()))
        }
    }

    impl PushFeed for EmptyBackend {
        fn subscribe(&self, _building_id: &str, _kind: TopicKind) -> Subscription {
            let (sender, _) = broadcast::channel(1);
            Subscription::new(sender.subscribe())
        }
    }

    fn empty_sources() -> EngineSources {
        let backend = Arc::new(EmptyBackend);
        EngineSources {
            baseline: backend.clone(),
            liveness: backend.clone(),
            history: backend.clone(),
            alerts: backend.clone(),
            env: backend.clone(),
            feed: backend,
        }
    }

    #[tokio::test]
    async fn snapshot_before_any_selection_is_empty_and_normal() {
        let handle = EngineHandle::spawn(empty_sources(), TimingConfig::default());

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.building_id.is_none());
        assert!(snapshot.node_statuses.is_empty());
        assert!(snapshot.top_k.is_empty());
        assert!(!snapshot.stale);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn select_building_loads_the_profile() {
        let handle = EngineHandle::spawn(empty_sources(), TimingConfig::default());

        handle.select_building("b-1").await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.building_id.as_deref(), Some("b-1"));
        assert_eq!(snapshot.thresholds.danger(), 0.6);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_thresholds_are_rejected_and_prior_state_retained() {
        let handle = EngineHandle::spawn(empty_sources(), TimingConfig::default());
        handle.select_building("b-1").await.unwrap();

        let result = handle.set_thresholds(0.6, 0.4, 0.2).await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidThresholds { .. })
        ));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.thresholds.caution(), 0.2);
        assert_eq!(snapshot.thresholds.danger(), 0.6);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn commands_after_shutdown_report_engine_closed() {
        let handle = EngineHandle::spawn(empty_sources(), TimingConfig::default());
        handle.shutdown().await;

        // give the actor time to drain
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            handle.snapshot().await,
            Err(EngineError::EngineClosed)
        ));
    }
}
