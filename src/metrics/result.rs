//! Collector results and the deep merge that combines them.
//!
//! Each collector fills in only the fields it owns. [`CollectorData`] has
//! one optional slot per top-level snapshot key; `None` means "not reported
//! by this collector". Map-valued slots unify key by key when merged, every
//! other slot is replaced wholesale.

use crate::metrics::data::{
    unix_timestamp, Battery, DiskMount, InterfaceStats, LoadAverage, MetricsSnapshot,
    NetworkStats, ProcessInfo, SystemInfo, ThermalPressure,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of one collector invocation.
///
/// Produced for every call; failures are encoded here instead of being
/// returned as errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorResult {
    pub success: bool,
    pub error: Option<String>,
    pub data: CollectorData,
}

impl CollectorResult {
    pub fn success(data: CollectorData) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    /// A failed result with empty data.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: CollectorData::default(),
        }
    }

    /// Deep-merge this result's data into `target`.
    pub fn merge_into(self, target: &mut CollectorData) {
        target.merge(self.data);
    }
}

/// Partial metrics reported by a single collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectorData {
    pub timestamp: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub cpu_count: Option<usize>,
    pub cpu_per_cpu: Option<Vec<f64>>,
    pub load_average: Option<LoadAverage>,
    pub memory_total_gb: Option<f64>,
    pub memory_used_gb: Option<f64>,
    pub memory_available_gb: Option<f64>,
    pub memory_percent: Option<f64>,
    pub swap_total_gb: Option<f64>,
    pub swap_used_gb: Option<f64>,
    pub swap_percent: Option<f64>,
    pub disk_total_gb: Option<f64>,
    pub disk_used_gb: Option<f64>,
    pub disk_percent: Option<f64>,
    pub disk_mounts: Option<Vec<DiskMount>>,
    pub disk_read_bytes: Option<u64>,
    pub disk_write_bytes: Option<u64>,
    pub uptime_sec: Option<f64>,
    pub battery: Option<Battery>,
    pub system_info: Option<SystemInfo>,
    pub temperatures: Option<BTreeMap<String, f64>>,
    pub fan_speeds: Option<BTreeMap<String, u32>>,
    pub power_estimates: Option<BTreeMap<String, f64>>,
    pub thermal_pressure: Option<ThermalPressure>,
    pub sensors_available: Option<bool>,
    /// Readings from fallback tools; they only fill gaps in `temperatures`
    pub temperatures_extra: Option<BTreeMap<String, f64>>,
    /// Readings from fallback tools; they only fill gaps in `fan_speeds`
    pub fan_speeds_extra: Option<BTreeMap<String, u32>>,
    pub network: Option<NetworkStats>,
    pub network_per_interface: Option<Vec<InterfaceStats>>,
    pub processes: Option<Vec<ProcessInfo>>,
}

macro_rules! replace_fields {
    ($target:ident, $incoming:ident; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $incoming.$field {
                $target.$field = Some(value);
            }
        )+
    };
}

macro_rules! unify_maps {
    ($target:ident, $incoming:ident; $($field:ident),+ $(,)?) => {
        $(
            if let Some(map) = $incoming.$field {
                $target.$field.get_or_insert_with(BTreeMap::new).extend(map);
            }
        )+
    };
}

impl CollectorData {
    /// Merge `incoming` into `self`.
    ///
    /// Mapping slots present on both sides merge key by key with the
    /// incoming value winning at the leaf; all other reported slots replace
    /// the accumulated value.
    pub fn merge(&mut self, incoming: CollectorData) {
        let target = self;
        unify_maps!(target, incoming;
            temperatures,
            fan_speeds,
            power_estimates,
            temperatures_extra,
            fan_speeds_extra,
        );
        replace_fields!(target, incoming;
            timestamp,
            cpu_percent,
            cpu_count,
            cpu_per_cpu,
            load_average,
            memory_total_gb,
            memory_used_gb,
            memory_available_gb,
            memory_percent,
            swap_total_gb,
            swap_used_gb,
            swap_percent,
            disk_total_gb,
            disk_used_gb,
            disk_percent,
            disk_mounts,
            disk_read_bytes,
            disk_write_bytes,
            uptime_sec,
            battery,
            system_info,
            thermal_pressure,
            sensors_available,
            network,
            network_per_interface,
            processes,
        );
    }

    /// Whether no slot has been reported.
    pub fn is_empty(&self) -> bool {
        *self == CollectorData::default()
    }

    /// Build the final snapshot from merged data.
    ///
    /// Unreported slots fall back to defaults, percentages are clamped to
    /// [0, 100], and fallback sensor readings fill only the names the
    /// primary source did not report.
    pub fn into_snapshot(self) -> MetricsSnapshot {
        let mut temperatures = self.temperatures.unwrap_or_default();
        let mut fan_speeds = self.fan_speeds.unwrap_or_default();
        let power_estimates = self.power_estimates.unwrap_or_default();

        let mut extras_found = false;
        for (name, celsius) in self.temperatures_extra.unwrap_or_default() {
            extras_found = true;
            temperatures.entry(name).or_insert(celsius);
        }
        for (name, rpm) in self.fan_speeds_extra.unwrap_or_default() {
            extras_found = true;
            fan_speeds.entry(name).or_insert(rpm);
        }

        let battery = self.battery;

        MetricsSnapshot {
            timestamp: self.timestamp.unwrap_or_else(unix_timestamp),
            cpu_percent: clamp_percent(self.cpu_percent),
            cpu_count: self.cpu_count.unwrap_or_default(),
            cpu_per_cpu: self
                .cpu_per_cpu
                .unwrap_or_default()
                .into_iter()
                .map(|p| clamp_percent(Some(p)))
                .collect(),
            load_average: self.load_average.unwrap_or_default(),
            memory_total_gb: non_negative(self.memory_total_gb),
            memory_used_gb: non_negative(self.memory_used_gb),
            memory_available_gb: non_negative(self.memory_available_gb),
            memory_percent: clamp_percent(self.memory_percent),
            swap_total_gb: non_negative(self.swap_total_gb),
            swap_used_gb: non_negative(self.swap_used_gb),
            swap_percent: clamp_percent(self.swap_percent),
            disk_total_gb: non_negative(self.disk_total_gb),
            disk_used_gb: non_negative(self.disk_used_gb),
            disk_percent: clamp_percent(self.disk_percent),
            disk_mounts: self.disk_mounts.unwrap_or_default(),
            disk_read_bytes: self.disk_read_bytes.unwrap_or_default(),
            disk_write_bytes: self.disk_write_bytes.unwrap_or_default(),
            uptime_sec: non_negative(self.uptime_sec),
            battery_percent: battery.map(|b| clamp_percent(Some(b.percent))),
            battery_plugged: battery.and_then(|b| b.plugged),
            battery_secs_left: battery.and_then(|b| b.secs_left),
            sensors_available: self.sensors_available.unwrap_or(false) || extras_found,
            temperatures,
            fan_speeds,
            power_estimates,
            thermal_pressure: self.thermal_pressure,
            network: self.network.unwrap_or_default(),
            network_per_interface: self.network_per_interface.unwrap_or_default(),
            processes: self.processes.unwrap_or_default(),
            system_info: self.system_info.unwrap_or_default(),
            error: None,
        }
    }
}

fn clamp_percent(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

fn non_negative(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.max(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temps(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_merge_unifies_nested_and_overwrites_scalars() {
        let mut target = CollectorData {
            temperatures: Some(temps(&[("y", 20.0)])),
            cpu_percent: Some(3.0),
            ..Default::default()
        };
        let incoming = CollectorResult::success(CollectorData {
            cpu_percent: Some(1.0),
            temperatures: Some(temps(&[("x", 10.0)])),
            ..Default::default()
        });

        incoming.merge_into(&mut target);

        assert_eq!(target.cpu_percent, Some(1.0));
        assert_eq!(target.temperatures, Some(temps(&[("x", 10.0), ("y", 20.0)])));
    }

    #[test]
    fn test_merge_incoming_wins_at_leaf() {
        let mut target = CollectorData {
            temperatures: Some(temps(&[("CPU", 40.0)])),
            ..Default::default()
        };
        target.merge(CollectorData {
            temperatures: Some(temps(&[("CPU", 55.0)])),
            ..Default::default()
        });
        assert_eq!(target.temperatures, Some(temps(&[("CPU", 55.0)])));
    }

    #[test]
    fn test_merge_replaces_lists_wholesale() {
        let mut target = CollectorData {
            cpu_per_cpu: Some(vec![1.0, 2.0, 3.0]),
            ..Default::default()
        };
        target.merge(CollectorData {
            cpu_per_cpu: Some(vec![9.0]),
            ..Default::default()
        });
        assert_eq!(target.cpu_per_cpu, Some(vec![9.0]));
    }

    #[test]
    fn test_unreported_fields_are_kept() {
        let mut target = CollectorData {
            memory_percent: Some(50.0),
            ..Default::default()
        };
        target.merge(CollectorData::default());
        assert_eq!(target.memory_percent, Some(50.0));
    }

    #[test]
    fn test_extras_only_fill_gaps() {
        let data = CollectorData {
            temperatures: Some(temps(&[("CPU", 70.0)])),
            temperatures_extra: Some(temps(&[("CPU", 48.0), ("GPU", 51.0)])),
            ..Default::default()
        };
        let snapshot = data.into_snapshot();
        assert_eq!(snapshot.temperatures.get("CPU"), Some(&70.0));
        assert_eq!(snapshot.temperatures.get("GPU"), Some(&51.0));
        assert!(snapshot.sensors_available);
    }

    #[test]
    fn test_snapshot_clamps_percentages() {
        let data = CollectorData {
            cpu_percent: Some(130.0),
            memory_percent: Some(-4.0),
            disk_percent: Some(f64::NAN),
            battery: Some(Battery {
                percent: 101.0,
                plugged: Some(true),
                secs_left: None,
            }),
            ..Default::default()
        };
        let snapshot = data.into_snapshot();
        assert_eq!(snapshot.cpu_percent, 100.0);
        assert_eq!(snapshot.memory_percent, 0.0);
        assert_eq!(snapshot.disk_percent, 0.0);
        assert_eq!(snapshot.battery_percent, Some(100.0));
        assert_eq!(snapshot.battery_plugged, Some(true));
    }

    #[test]
    fn test_failure_has_empty_data() {
        let result = CollectorResult::failure("unsupported platform: plan9");
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(result.data.is_empty());
    }
}
