//! Aggregate collection: run every source, merge, finalize.

use crate::config::MetricsConfig;
use crate::metrics::cache::{Powermetrics, SamplingCache};
use crate::metrics::data::MetricsSnapshot;
use crate::metrics::result::CollectorData;
use crate::metrics::sources::{
    ExternalToolsCollector, HostCollector, NetworkCollector, ProcessCollector, ThermalCollector,
};
use crate::metrics::traits::{Collector, MetricsProvider};
use futures_util::future::join_all;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

/// Which collectors take part in a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectionScope {
    /// Host counters and sensors
    #[default]
    Basic,
    /// Basic plus network counters and the process table
    Full,
}

/// Produces complete [`MetricsSnapshot`]s from a host collector and a
/// list of secondary collectors.
///
/// The host collector runs first; if it fails the snapshot carries only its
/// error. Secondary collectors then run concurrently and are merged in list
/// order, so the primary sensor source must precede fallback tools.
pub struct MetricsCollector {
    host: Box<dyn Collector>,
    sources: Vec<Box<dyn Collector>>,
}

impl MetricsCollector {
    pub fn new(host: Box<dyn Collector>, sources: Vec<Box<dyn Collector>>) -> Self {
        Self { host, sources }
    }

    /// The standard collector set for `scope`, sharing `cache` for sensor reports.
    pub fn from_config(
        config: &MetricsConfig,
        scope: CollectionScope,
        cache: Arc<SamplingCache<Powermetrics>>,
    ) -> Self {
        let host = HostCollector::new(config.disk_mounts_max)
            .with_tool_timeout(config.external_tools_timeout());

        let mut sources: Vec<Box<dyn Collector>> = vec![
            Box::new(ThermalCollector::new(
                cache,
                config.powermetrics_timeout(),
                config.cache_ttl(),
            )),
            Box::new(ExternalToolsCollector::with_default_tools(config.external_tools_timeout())),
        ];
        if scope == CollectionScope::Full {
            sources.push(Box::new(NetworkCollector::new(config.network_per_interface)));
            sources.push(Box::new(ProcessCollector::new(config.process_top_n)));
        }

        Self::new(Box::new(host), sources)
    }

    /// Names of the collectors in run order.
    pub fn collector_names(&self) -> Vec<&'static str> {
        std::iter::once(self.host.name())
            .chain(self.sources.iter().map(|c| c.name()))
            .collect()
    }

    /// Run one collection cycle.
    pub async fn collect(&mut self) -> MetricsSnapshot {
        let host = self.host.collect_safe().await;
        if !host.success {
            let error = host
                .error
                .unwrap_or_else(|| format!("{} collector failed", self.host.name()));
            warn!("collection failed: {}", error);
            return MetricsSnapshot::with_error(error);
        }

        let mut merged = CollectorData::default();
        host.merge_into(&mut merged);

        let results = join_all(self.sources.iter_mut().map(|c| c.collect_safe())).await;
        for (collector, result) in self.sources.iter().zip(results) {
            if result.success {
                result.merge_into(&mut merged);
            } else {
                debug!(
                    "{} collector failed: {}",
                    collector.name(),
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        merged.into_snapshot()
    }
}

impl MetricsProvider for MetricsCollector {
    async fn collect_snapshot(&mut self) -> MetricsSnapshot {
        self.collect().await
    }

    fn into_stream(self, interval_ms: u64) -> BoxStream<'static, MetricsSnapshot>
    where
        Self: Sized + Send + 'static,
    {
        let mut interval = time::interval(Duration::from_millis(interval_ms.max(1)));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        stream::unfold((self, interval), |(mut collector, mut interval)| async move {
            interval.tick().await;
            let snapshot = collector.collect().await;
            Some((snapshot, (collector, interval)))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::result::CollectorResult;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct Fixed(&'static str, CollectorResult);

    #[async_trait]
    impl Collector for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn collect(&mut self) -> CollectorResult {
            self.1.clone()
        }
    }

    struct Panicking;

    #[async_trait]
    impl Collector for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn collect(&mut self) -> CollectorResult {
            panic!("boom");
        }
    }

    fn host_ok() -> Box<dyn Collector> {
        Box::new(Fixed(
            "host",
            CollectorResult::success(CollectorData {
                cpu_percent: Some(12.5),
                memory_percent: Some(40.0),
                ..Default::default()
            }),
        ))
    }

    fn temps(pairs: &[(&str, f64)]) -> Option<BTreeMap<String, f64>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[tokio::test]
    async fn test_host_failure_yields_error_snapshot() {
        let host = Box::new(Fixed("host", CollectorResult::failure("unsupported platform: plan9")));
        let sensors = Box::new(Fixed(
            "thermal",
            CollectorResult::success(CollectorData {
                temperatures: temps(&[("CPU", 50.0)]),
                ..Default::default()
            }),
        ));
        let mut collector = MetricsCollector::new(host, vec![sensors]);

        let snapshot = collector.collect().await;
        assert_eq!(snapshot.error.as_deref(), Some("unsupported platform: plan9"));
        assert!(snapshot.temperatures.is_empty());
        assert_eq!(snapshot.cpu_percent, 0.0);
    }

    #[tokio::test]
    async fn test_primary_sensor_wins_over_fallback() {
        let primary = Box::new(Fixed(
            "thermal",
            CollectorResult::success(CollectorData {
                temperatures: temps(&[("CPU", 70.0)]),
                sensors_available: Some(true),
                ..Default::default()
            }),
        ));
        let fallback = Box::new(Fixed(
            "external",
            CollectorResult::success(CollectorData {
                temperatures_extra: temps(&[("CPU", 45.0), ("Battery", 31.0)]),
                ..Default::default()
            }),
        ));
        let mut collector = MetricsCollector::new(host_ok(), vec![primary, fallback]);

        let snapshot = collector.collect().await;
        assert!(snapshot.is_ok());
        assert_eq!(snapshot.cpu_percent, 12.5);
        assert_eq!(snapshot.temperatures.get("CPU"), Some(&70.0));
        assert_eq!(snapshot.temperatures.get("Battery"), Some(&31.0));
        assert!(snapshot.sensors_available);
    }

    #[tokio::test]
    async fn test_secondary_failures_are_absorbed() {
        let failing = Box::new(Fixed("network", CollectorResult::failure("no interfaces")));
        let mut collector = MetricsCollector::new(host_ok(), vec![failing, Box::new(Panicking)]);

        let snapshot = collector.collect().await;
        assert!(snapshot.is_ok());
        assert_eq!(snapshot.memory_percent, 40.0);
        assert!(!snapshot.sensors_available);
    }

    #[tokio::test]
    async fn test_stream_yields_snapshots() {
        let collector = MetricsCollector::new(host_ok(), Vec::new());
        let snapshots: Vec<MetricsSnapshot> = collector.into_stream(5).take(2).collect().await;
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.cpu_percent == 12.5));
    }

    #[test]
    fn test_full_scope_adds_network_and_processes() {
        let config = MetricsConfig::default();
        let cache = Arc::new(SamplingCache::new(Powermetrics::default()));

        let basic = MetricsCollector::from_config(&config, CollectionScope::Basic, cache.clone());
        assert_eq!(basic.collector_names(), vec!["host", "thermal", "external"]);

        let full = MetricsCollector::from_config(&config, CollectionScope::Full, cache);
        assert_eq!(
            full.collector_names(),
            vec!["host", "thermal", "external", "network", "processes"]
        );
    }
}
