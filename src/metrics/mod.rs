//! Host metrics acquisition.
//!
//! Independent collectors each report a partial [`CollectorResult`]; the
//! [`MetricsCollector`] merges them into one [`MetricsSnapshot`]. Sensor
//! text from diagnostic tools is turned into readings by the
//! [`parser`] matchers, with the slow sensor tool sitting behind a
//! [`SamplingCache`].

pub mod cache;
pub mod collector;
pub mod command;
pub mod data;
pub mod parser;
pub mod result;
pub mod sources;
pub mod traits;

// Re-export commonly used items
pub use cache::{Powermetrics, SamplingCache, SensorTool};
pub use collector::{CollectionScope, MetricsCollector};
pub use data::{MetricsSnapshot, ThermalPressure};
pub use parser::{SensorParser, SensorReadings};
pub use result::{CollectorData, CollectorResult};
pub use traits::{Collector, MetricsProvider};
