//! # hostpulse - host metrics, sensors and alerts
//!
//! Periodically samples operating-system metrics on macOS and Linux, merges
//! the output of several independent collectors into one [`MetricsSnapshot`],
//! evaluates threshold alerts against it and keeps a bounded history.
//!
//! ## Features
//!
//! - **Failure-isolated collectors**: host counters, network, processes,
//!   thermal/power sensors and optional third-party CLI helpers
//! - **Sensor text parsing**: `powermetrics`, `istats`, `osx-cpu-temp` and
//!   `lm-sensors` output turned into typed readings
//! - **Alerting**: threshold rules with per-rule cooldown and a bounded event log
//! - **History**: bounded in-memory series with optional JSON persistence
//! - **HTTP API**: JSON and Prometheus views of the latest snapshot
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hostpulse::{CollectionScope, ConfigLoader, Monitor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load()?;
//!     let mut monitor = Monitor::from_config(&config, CollectionScope::Basic);
//!
//!     let tick = monitor.tick().await;
//!     println!("cpu {:.1}%", tick.snapshot.cpu_percent);
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod metrics;
pub mod monitor;
pub mod web;

// Re-export public API
pub use alerts::{default_rules, AlertEngine, AlertEvent, AlertRule, Operator, Severity};
pub use config::{ConfigLoader, MonitorConfig};
pub use error::{MonitorError, Result, ToolError};
pub use history::HistoryBuffer;
pub use metrics::{
    data::{thermal_pressure_level, ThermalPressure},
    CollectionScope, Collector, CollectorData, CollectorResult, MetricsCollector, MetricsProvider,
    MetricsSnapshot, SamplingCache, SensorParser,
};
pub use monitor::{Monitor, MonitorState, Tick};
pub use web::{start_web_server, WebConfig};

/// The default HTTP API port
pub const DEFAULT_API_PORT: u16 = 8765;

/// The default polling interval in seconds
pub const DEFAULT_REFRESH_INTERVAL_SEC: u64 = 3;
