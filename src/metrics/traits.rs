//! Traits for metrics collection.

use crate::metrics::data::MetricsSnapshot;
use crate::metrics::result::CollectorResult;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// One independent, failure-isolated source of metrics.
///
/// Implementations must not panic or return early with partial state: every
/// failure mode is reported through [`CollectorResult::failure`] or absorbed
/// as missing data.
#[async_trait]
pub trait Collector: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Run one collection.
    async fn collect(&mut self) -> CollectorResult;

    /// Run [`collect`](Collector::collect), turning a panic into a failed result.
    async fn collect_safe(&mut self) -> CollectorResult {
        let name = self.name();
        match AssertUnwindSafe(self.collect()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!("collector {} panicked: {}", name, message);
                CollectorResult::failure(message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "collector panicked".to_string()
    }
}

/// Trait for producing complete snapshots.
///
/// Collection itself cannot fail: problems surface in
/// [`MetricsSnapshot::error`] or as absent fields.
pub trait MetricsProvider {
    /// Collect a single snapshot of host metrics.
    fn collect_snapshot(&mut self) -> impl std::future::Future<Output = MetricsSnapshot> + Send;

    /// Start continuous collection at the given interval.
    fn into_stream(self, interval_ms: u64) -> BoxStream<'static, MetricsSnapshot>
    where
        Self: Sized + Send + 'static;
}
