//! The polling loop: collect, evaluate alerts, record history.

use crate::alerts::{default_rules, AlertEngine, AlertEvent};
use crate::config::MonitorConfig;
use crate::history::{HistoryBuffer, SaveJob};
use crate::metrics::{CollectionScope, MetricsCollector, MetricsSnapshot, Powermetrics, SamplingCache};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time;
use tracing::{info, warn};

/// State shared between the polling loop and its readers.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct MonitorState {
    latest: Arc<RwLock<Option<MetricsSnapshot>>>,
    alerts: Arc<Mutex<AlertEngine>>,
    history: Arc<Mutex<HistoryBuffer>>,
}

impl MonitorState {
    pub fn new(alerts: AlertEngine, history: HistoryBuffer) -> Self {
        Self {
            latest: Arc::new(RwLock::new(None)),
            alerts: Arc::new(Mutex::new(alerts)),
            history: Arc::new(Mutex::new(history)),
        }
    }

    /// The most recent snapshot, including error snapshots.
    pub async fn latest(&self) -> Option<MetricsSnapshot> {
        self.latest.read().await.clone()
    }

    pub async fn set_latest(&self, snapshot: MetricsSnapshot) {
        *self.latest.write().await = Some(snapshot);
    }

    pub fn alerts(&self) -> &Mutex<AlertEngine> {
        &self.alerts
    }

    pub fn history(&self) -> &Mutex<HistoryBuffer> {
        &self.history
    }

    /// Flush history to disk, logging any failure.
    pub async fn save_history(&self) {
        let job = self.history.lock().await.save_job();
        if let Some(job) = job {
            self.run_save(job).await;
        }
    }

    /// Write off the async runtime without holding the history lock.
    async fn run_save(&self, job: SaveJob) {
        match job.write_async().await {
            Ok(()) => self.history.lock().await.mark_saved(),
            Err(err) => warn!("failed to save history: {}", err),
        }
    }
}

/// Outcome of one polling cycle.
#[derive(Debug, Clone)]
pub struct Tick {
    pub snapshot: MetricsSnapshot,
    /// Alerts fired by this snapshot
    pub events: Vec<AlertEvent>,
}

pub struct Monitor {
    collector: MetricsCollector,
    state: MonitorState,
}

impl Monitor {
    pub fn new(collector: MetricsCollector, alerts: AlertEngine, history: HistoryBuffer) -> Self {
        Self {
            collector,
            state: MonitorState::new(alerts, history),
        }
    }

    /// Build the standard collectors, the predefined alert rules and the
    /// history buffer, loading previously persisted history when enabled.
    pub fn from_config(config: &MonitorConfig, scope: CollectionScope) -> Self {
        let tool = Powermetrics::new(config.metrics.powermetrics_samplers.clone());
        let cache = Arc::new(SamplingCache::new(tool));
        let collector = MetricsCollector::from_config(&config.metrics, scope, cache);
        let alerts = AlertEngine::with_rules(default_rules(&config.alerts));
        Self::new(collector, alerts, history_from_config(config))
    }

    /// A handle on the shared state for readers such as the HTTP server.
    pub fn state(&self) -> MonitorState {
        self.state.clone()
    }

    /// Run one cycle.
    ///
    /// Alerts are only evaluated against snapshots without an error.
    pub async fn tick(&mut self) -> Tick {
        let snapshot = self.collector.collect().await;

        let events = if snapshot.is_ok() {
            self.state.alerts.lock().await.evaluate(&snapshot)
        } else {
            Vec::new()
        };
        let save = self.state.history.lock().await.push(snapshot.clone());
        if let Some(job) = save {
            self.state.run_save(job).await;
        }
        self.state.set_latest(snapshot.clone()).await;

        Tick { snapshot, events }
    }

    /// Tick every `interval`, starting immediately.
    pub fn into_stream(self, interval: Duration) -> BoxStream<'static, Tick> {
        let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        stream::unfold((self, ticker), |(mut monitor, mut ticker)| async move {
            ticker.tick().await;
            let tick = monitor.tick().await;
            Some((tick, (monitor, ticker)))
        })
        .boxed()
    }
}

/// In-memory history sized from config, with persistence when enabled.
pub fn history_from_config(config: &MonitorConfig) -> HistoryBuffer {
    let persistence = &config.persistence;
    if !persistence.enabled {
        return HistoryBuffer::new(config.monitor.history_points);
    }

    let mut history = HistoryBuffer::new(persistence.max_points)
        .with_persistence(&persistence.path, persistence.save_interval());
    match history.load() {
        Ok(0) => {}
        Ok(count) => info!("restored {} snapshots from history", count),
        Err(err) => warn!("could not load history: {}", err),
    }
    history
}
