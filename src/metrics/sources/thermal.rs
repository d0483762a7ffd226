//! Platform thermal, fan and power telemetry via the cached sensor report.

use crate::metrics::cache::{Powermetrics, SamplingCache, SensorTool};
use crate::metrics::parser::SensorParser;
use crate::metrics::result::{CollectorData, CollectorResult};
use crate::metrics::traits::Collector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ThermalCollector<T = Powermetrics> {
    cache: Arc<SamplingCache<T>>,
    parser: SensorParser,
    timeout: Duration,
    ttl: Duration,
}

impl<T: SensorTool> ThermalCollector<T> {
    pub fn new(cache: Arc<SamplingCache<T>>, timeout: Duration, ttl: Duration) -> Self {
        Self {
            cache,
            parser: SensorParser::powermetrics(),
            timeout,
            ttl,
        }
    }
}

#[async_trait]
impl<T: SensorTool + 'static> Collector for ThermalCollector<T> {
    fn name(&self) -> &'static str {
        "thermal"
    }

    async fn collect(&mut self) -> CollectorResult {
        let raw = self.cache.get_or_run(self.timeout, self.ttl).await;
        if raw.trim().is_empty() {
            debug!("no sensor report available");
            return CollectorResult::success(CollectorData {
                sensors_available: Some(false),
                ..Default::default()
            });
        }

        let readings = self.parser.parse(&raw);
        CollectorResult::success(CollectorData {
            sensors_available: Some(!readings.is_empty()),
            thermal_pressure: readings.thermal_pressure,
            temperatures: Some(readings.temperatures),
            fan_speeds: Some(readings.fan_speeds),
            power_estimates: Some(readings.power_estimates),
            ..Default::default()
        })
    }
}
