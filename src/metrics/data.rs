//! Data structures for host metrics.
//!
//! [`MetricsSnapshot`] is the contract handed to presentation layers: the
//! REST endpoint serializes it as-is and the history file stores a list of
//! them under `{"history": [...]}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One complete, timestamped result of a collection cycle.
///
/// When `error` is set every other field holds its default and must be
/// treated as "no data available".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub cpu_percent: f64,
    pub cpu_count: usize,
    /// Per-core usage percentages, in core order
    pub cpu_per_cpu: Vec<f64>,
    pub load_average: LoadAverage,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
    pub memory_available_gb: f64,
    pub memory_percent: f64,
    pub swap_total_gb: f64,
    pub swap_used_gb: f64,
    pub swap_percent: f64,
    /// Root filesystem usage
    pub disk_total_gb: f64,
    pub disk_used_gb: f64,
    pub disk_percent: f64,
    pub disk_mounts: Vec<DiskMount>,
    /// Cumulative bytes read since boot. Rates are derived by the caller.
    pub disk_read_bytes: u64,
    /// Cumulative bytes written since boot. Rates are derived by the caller.
    pub disk_write_bytes: u64,
    pub uptime_sec: f64,
    /// `None` on hosts without a battery
    pub battery_percent: Option<f64>,
    pub battery_plugged: Option<bool>,
    pub battery_secs_left: Option<u64>,
    /// Sensor name to degrees Celsius
    pub temperatures: BTreeMap<String, f64>,
    /// Fan name to RPM
    pub fan_speeds: BTreeMap<String, u32>,
    /// Subsystem name to Watts
    pub power_estimates: BTreeMap<String, f64>,
    pub thermal_pressure: Option<ThermalPressure>,
    /// Whether any sensor source produced readings this cycle
    pub sensors_available: bool,
    pub network: NetworkStats,
    pub network_per_interface: Vec<InterfaceStats>,
    pub processes: Vec<ProcessInfo>,
    pub system_info: SystemInfo,
    pub error: Option<String>,
}

impl MetricsSnapshot {
    /// Create an error-only snapshot; all other fields keep their defaults.
    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            timestamp: unix_timestamp(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Whether this snapshot carries usable data.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Resolve a metric key to a comparable number.
    ///
    /// Scalar gauges are addressed by field name. `thermal_pressure` resolves
    /// to its ordinal. Nested values use dotted paths such as
    /// `load_average.load_5` or `temperatures.CPU_die_temperature`.
    /// Returns `None` when the metric is absent on this host.
    pub fn metric_value(&self, key: &str) -> Option<f64> {
        let value = match key {
            "timestamp" => self.timestamp,
            "cpu_percent" => self.cpu_percent,
            "cpu_count" => self.cpu_count as f64,
            "memory_total_gb" => self.memory_total_gb,
            "memory_used_gb" => self.memory_used_gb,
            "memory_available_gb" => self.memory_available_gb,
            "memory_percent" => self.memory_percent,
            "swap_total_gb" => self.swap_total_gb,
            "swap_used_gb" => self.swap_used_gb,
            "swap_percent" => self.swap_percent,
            "disk_total_gb" => self.disk_total_gb,
            "disk_used_gb" => self.disk_used_gb,
            "disk_percent" => self.disk_percent,
            "disk_read_bytes" => self.disk_read_bytes as f64,
            "disk_write_bytes" => self.disk_write_bytes as f64,
            "uptime_sec" => self.uptime_sec,
            "battery_percent" => return self.battery_percent,
            "battery_secs_left" => return self.battery_secs_left.map(|s| s as f64),
            "thermal_pressure" => return self.thermal_pressure.map(|p| f64::from(p.level())),
            _ => return self.nested_metric_value(key),
        };
        Some(value)
    }

    fn nested_metric_value(&self, key: &str) -> Option<f64> {
        let (group, name) = key.split_once('.')?;
        match group {
            "load_average" => match name {
                "load_1" => Some(self.load_average.load_1),
                "load_5" => Some(self.load_average.load_5),
                "load_15" => Some(self.load_average.load_15),
                _ => None,
            },
            "temperatures" => self.temperatures.get(name).copied(),
            "fan_speeds" => self.fan_speeds.get(name).map(|rpm| f64::from(*rpm)),
            "power_estimates" => self.power_estimates.get(name).copied(),
            "network" => match name {
                "bytes_sent" => Some(self.network.bytes_sent as f64),
                "bytes_recv" => Some(self.network.bytes_recv as f64),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Load averages over 1, 5 and 15 minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
}

/// Usage of a single mount point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskMount {
    pub mountpoint: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percent: f64,
    pub device: String,
    pub fstype: String,
}

/// Host-wide network counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: u64,
    pub dropout: u64,
}

/// Counters for a single network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub interface: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    /// Administrative link state; `None` where it cannot be read
    pub isup: Option<bool>,
}

/// A single process at collection time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_rss_mb: f64,
    pub status: String,
    pub username: String,
    /// Start time, seconds since the Unix epoch
    pub create_time: f64,
    /// `None` where the platform does not expose per-process threads
    pub num_threads: Option<usize>,
    pub exe: String,
}

/// Battery state when the host has one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub percent: f64,
    pub plugged: Option<bool>,
    pub secs_left: Option<u64>,
}

/// Static host descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub platform: String,
    pub platform_release: String,
    pub platform_version: String,
    pub architecture: String,
    pub processor: String,
    pub logical_cores: usize,
    pub total_memory_gb: f64,
}

/// Platform-reported thermal pressure, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThermalPressure {
    Nominal,
    Moderate,
    Serious,
    Heavy,
    Critical,
}

impl ThermalPressure {
    /// All levels in ordinal order.
    pub const ALL: [ThermalPressure; 5] = [
        ThermalPressure::Nominal,
        ThermalPressure::Moderate,
        ThermalPressure::Serious,
        ThermalPressure::Heavy,
        ThermalPressure::Critical,
    ];

    /// Ordinal rank, 0 (Nominal) through 4 (Critical).
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "Nominal",
            Self::Moderate => "Moderate",
            Self::Serious => "Serious",
            Self::Heavy => "Heavy",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for ThermalPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThermalPressure {
    type Err = crate::error::MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                crate::error::MonitorError::parse_error(format!("unknown thermal pressure level: {}", s))
            })
    }
}

/// Numeric thermal pressure level for ordering, or -1 when unknown.
///
/// Matching is case-insensitive; an absent or unrecognised level is a normal
/// "no data" state rather than an error.
pub fn thermal_pressure_level(level: Option<&str>) -> i32 {
    level
        .and_then(|l| l.parse::<ThermalPressure>().ok())
        .map_or(-1, |p| i32::from(p.level()))
}

/// Heavy or Critical.
pub fn is_thermal_critical(level: Option<&str>) -> bool {
    thermal_pressure_level(level) >= i32::from(ThermalPressure::Heavy.level())
}

/// Current time as fractional seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
