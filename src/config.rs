//! Layered configuration.
//!
//! Values resolve from built-in defaults, then an optional TOML file, then
//! `HOSTPULSE_`-prefixed environment variables, with later layers winning.
//! Nested keys use `__` in variable names, so `HOSTPULSE_ALERTS__CPU_PERCENT`
//! sets `alerts.cpu_percent`.

use crate::error::{MonitorError, Result};
use crate::web::WebConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::Value;
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HOSTPULSE_";
/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "hostpulse.toml";
/// Directory under the home directory holding config and history.
pub const CONFIG_DIR_NAME: &str = ".hostpulse";

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub monitor: PollingConfig,
    pub metrics: MetricsConfig,
    pub alerts: AlertsConfig,
    pub api: WebConfig,
    pub persistence: PersistenceConfig,
}

/// Polling cadence and in-memory history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub refresh_interval_sec: u64,
    pub history_points: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_sec: crate::DEFAULT_REFRESH_INTERVAL_SEC,
            history_points: 300,
        }
    }
}

impl PollingConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_sec)
    }
}

/// Collector limits and timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub powermetrics_timeout_sec: u64,
    pub external_tools_timeout_sec: u64,
    pub powermetrics_cache_ttl_sec: u64,
    /// Sampler sets, most detailed first
    pub powermetrics_samplers: Vec<String>,
    pub process_top_n: usize,
    pub disk_mounts_max: usize,
    pub network_per_interface: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            powermetrics_timeout_sec: 8,
            external_tools_timeout_sec: 3,
            powermetrics_cache_ttl_sec: 2,
            powermetrics_samplers: crate::metrics::Powermetrics::default_samplers(),
            process_top_n: 20,
            disk_mounts_max: 20,
            network_per_interface: true,
        }
    }
}

impl MetricsConfig {
    pub fn powermetrics_timeout(&self) -> Duration {
        Duration::from_secs(self.powermetrics_timeout_sec)
    }

    pub fn external_tools_timeout(&self) -> Duration {
        Duration::from_secs(self.external_tools_timeout_sec)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.powermetrics_cache_ttl_sec)
    }
}

/// Thresholds for the predefined alert rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub battery_percent: f64,
    pub thermal_critical: bool,
    pub cooldown_sec: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_percent: 90.0,
            memory_percent: 90.0,
            disk_percent: 95.0,
            battery_percent: 10.0,
            thermal_critical: true,
            cooldown_sec: crate::alerts::DEFAULT_COOLDOWN_SEC,
        }
    }
}

/// Durable history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// May start with `~`
    pub path: String,
    pub max_points: usize,
    pub save_interval_sec: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: format!("~/{}/history.json", CONFIG_DIR_NAME),
            max_points: 10_000,
            save_interval_sec: 60,
        }
    }
}

impl PersistenceConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_sec)
    }
}

/// Resolves [`MonitorConfig`] from its layered sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit TOML file instead of searching the default locations.
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// The TOML file that will be read, if any.
    pub fn config_file(&self) -> Option<PathBuf> {
        match &self.config_path {
            Some(path) => Some(path.clone()),
            None => Self::find_default_config_path(),
        }
    }

    fn find_default_config_path() -> Option<PathBuf> {
        let candidates = [
            std::env::current_dir().ok().map(|d| d.join(CONFIG_FILE_NAME)),
            dirs::home_dir().map(|d| d.join(CONFIG_DIR_NAME).join("config.toml")),
        ];
        candidates.into_iter().flatten().find(|path| path.exists())
    }

    /// The merged provider stack.
    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(MonitorConfig::default()));

        if let Some(path) = self.config_file() {
            if !path.exists() {
                return Err(MonitorError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            debug!("loading config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Resolve and validate the configuration.
    pub fn load(&self) -> Result<MonitorConfig> {
        let config: MonitorConfig = self.figment()?.extract()?;
        validate(&config)?;
        Ok(config)
    }

    /// Look up a single value by dot path, e.g. `alerts.cpu_percent`.
    pub fn find_value(&self, key: &str) -> Result<Value> {
        Ok(self.figment()?.find_value(key)?)
    }
}

/// Reject settings the monitor cannot run with.
pub fn validate(config: &MonitorConfig) -> Result<()> {
    if config.api.port == 0 {
        return Err(MonitorError::config_error("api.port cannot be 0"));
    }
    if config.monitor.refresh_interval_sec == 0 {
        return Err(MonitorError::config_error("monitor.refresh_interval_sec cannot be 0"));
    }
    if config.monitor.history_points == 0 {
        return Err(MonitorError::config_error("monitor.history_points cannot be 0"));
    }
    if config.persistence.max_points == 0 {
        return Err(MonitorError::config_error("persistence.max_points cannot be 0"));
    }
    if config.metrics.powermetrics_samplers.is_empty() {
        return Err(MonitorError::config_error("metrics.powermetrics_samplers cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.metrics.powermetrics_timeout_sec, 8);
        assert_eq!(config.metrics.external_tools_timeout_sec, 3);
        assert_eq!(config.metrics.powermetrics_cache_ttl_sec, 2);
        assert_eq!(config.metrics.process_top_n, 20);
        assert_eq!(config.alerts.disk_percent, 95.0);
        assert_eq!(config.alerts.battery_percent, 10.0);
        assert_eq!(config.api.port, 8765);
        assert!(!config.persistence.enabled);
        assert_eq!(config.persistence.max_points, 10_000);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_file_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE_NAME,
                r#"
                [alerts]
                cpu_percent = 75.0
                memory_percent = 80.0

                [metrics]
                process_top_n = 5
                "#,
            )?;
            jail.set_env("HOSTPULSE_ALERTS__CPU_PERCENT", "65.5");

            let config = ConfigLoader::new().load().map_err(|e| e.to_string())?;
            assert_eq!(config.alerts.cpu_percent, 65.5);
            assert_eq!(config.alerts.memory_percent, 80.0);
            assert_eq!(config.alerts.disk_percent, 95.0);
            assert_eq!(config.metrics.process_top_n, 5);
            Ok(())
        });
    }

    #[test]
    fn test_find_value_by_dot_path() {
        Jail::expect_with(|jail| {
            jail.set_env("HOSTPULSE_METRICS__DISK_MOUNTS_MAX", "7");
            let loader = ConfigLoader::new();
            let value = loader.find_value("metrics.disk_mounts_max").map_err(|e| e.to_string())?;
            assert_eq!(value.to_num().and_then(|n| n.to_u128()), Some(7));
            assert!(loader.find_value("metrics.no_such_key").is_err());
            Ok(())
        });
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        Jail::expect_with(|_jail| {
            let err = ConfigLoader::new().with_config_path("missing.toml").load().unwrap_err();
            assert!(matches!(err, MonitorError::Config(_)));
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        Jail::expect_with(|jail| {
            jail.set_env("HOSTPULSE_API__PORT", "0");
            assert!(ConfigLoader::new().load().is_err());
            Ok(())
        });
    }
}
