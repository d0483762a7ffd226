//! Short-TTL memoization in front of the sensor-reporting tool.
//!
//! `powermetrics` takes about a second per sample and may be polled more
//! often than that. The cache keeps the last non-empty report and hands it
//! back until the TTL runs out. Empty or failed runs are never cached, so
//! the next call retries immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::metrics::command::run_tool;

/// A slow external tool that produces a raw text report.
#[async_trait]
pub trait SensorTool: Send + Sync {
    /// Produce a report, or an empty string when nothing could be sampled.
    async fn sample(&self, timeout: Duration) -> String;
}

#[async_trait]
impl<T: SensorTool + ?Sized> SensorTool for Arc<T> {
    async fn sample(&self, timeout: Duration) -> String {
        (**self).sample(timeout).await
    }
}

/// `powermetrics`, trying sampler sets from most to least detailed.
#[derive(Debug, Clone)]
pub struct Powermetrics {
    samplers: Vec<String>,
    interval_ms: u32,
}

impl Powermetrics {
    pub fn new(samplers: Vec<String>) -> Self {
        Self {
            samplers,
            interval_ms: 1000,
        }
    }

    /// The default sampler order: Apple Silicon first, then Intel SMC.
    pub fn default_samplers() -> Vec<String> {
        vec![
            "thermal,cpu_power,gpu_power,ane_power".to_string(),
            "thermal,cpu_power,gpu_power".to_string(),
            "smc".to_string(),
        ]
    }
}

impl Default for Powermetrics {
    fn default() -> Self {
        Self::new(Self::default_samplers())
    }
}

#[async_trait]
impl SensorTool for Powermetrics {
    async fn sample(&self, timeout: Duration) -> String {
        let interval = self.interval_ms.to_string();
        for samplers in &self.samplers {
            let args = ["--samplers", samplers.as_str(), "-i", interval.as_str(), "-n", "1"];
            match run_tool("powermetrics", &args, timeout).await {
                Ok(output) if !output.stdout.trim().is_empty() => return output.stdout,
                Ok(_) => debug!("powermetrics --samplers {} produced no output", samplers),
                Err(err) if err.is_not_found() => {
                    debug!("{}", err);
                    break;
                }
                Err(err) => debug!("powermetrics --samplers {}: {}", samplers, err),
            }
        }
        String::new()
    }
}

/// Memoizes the last non-empty report of a [`SensorTool`].
///
/// One instance is created at startup and shared by reference. Concurrent
/// callers are serialized on the inner lock, so at most one tool run is in
/// flight.
pub struct SamplingCache<T> {
    tool: T,
    last: Mutex<Option<(Instant, String)>>,
}

impl<T: SensorTool> SamplingCache<T> {
    pub fn new(tool: T) -> Self {
        Self {
            tool,
            last: Mutex::new(None),
        }
    }

    /// Return the cached report if younger than `ttl`, otherwise run the tool.
    pub async fn get_or_run(&self, timeout: Duration, ttl: Duration) -> String {
        let mut last = self.last.lock().await;
        if let Some((taken_at, text)) = last.as_ref() {
            if taken_at.elapsed() < ttl {
                return text.clone();
            }
        }

        let raw = self.tool.sample(timeout).await;
        if !raw.trim().is_empty() {
            *last = Some((Instant::now(), raw.clone()));
        }
        raw
    }

    /// Drop the cached report.
    pub async fn invalidate(&self) {
        *self.last.lock().await = None;
    }
}
