//! Threshold alerting over metrics snapshots.
//!
//! An [`AlertEngine`] holds a set of [`AlertRule`]s keyed by id. Each call to
//! [`AlertEngine::evaluate`] resolves every enabled rule's metric from the
//! snapshot, compares it against the threshold and fires an [`AlertEvent`]
//! when the comparison holds and the rule's cooldown has elapsed. Fired
//! events are kept in a ring of at most [`MAX_EVENTS`] entries.

use crate::config::AlertsConfig;
use crate::metrics::data::{unix_timestamp, MetricsSnapshot, ThermalPressure};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::info;

/// Upper bound on retained events; the oldest is evicted first.
pub const MAX_EVENTS: usize = 500;

/// Cooldown applied when a rule does not specify one.
pub const DEFAULT_COOLDOWN_SEC: f64 = 60.0;

/// Comparison between a metric value and a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Operator {
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => value == threshold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

/// A user-defined threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique identifier; generated when omitted
    #[serde(default = "generate_rule_id")]
    pub id: String,
    pub name: String,
    /// Key understood by [`MetricsSnapshot::metric_value`]
    pub metric: String,
    pub operator: Operator,
    /// Threshold
    pub value: f64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum seconds between two firings
    #[serde(default = "default_cooldown")]
    pub cooldown_sec: f64,
}

fn generate_rule_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown() -> f64 {
    DEFAULT_COOLDOWN_SEC
}

impl AlertRule {
    /// An enabled warning rule with the default cooldown.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric: impl Into<String>,
        operator: Operator,
        value: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric: metric.into(),
            operator,
            value,
            severity: Severity::Warning,
            enabled: true,
            cooldown_sec: DEFAULT_COOLDOWN_SEC,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_cooldown(mut self, cooldown_sec: f64) -> Self {
        self.cooldown_sec = cooldown_sec;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A single firing of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_id: String,
    pub rule_name: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub message: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// Rule set, cooldown bookkeeping and bounded event history.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    events: VecDeque<AlertEvent>,
    last_fire: HashMap<String, f64>,
    max_events: usize,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            events: VecDeque::new(),
            last_fire: HashMap::new(),
            max_events: MAX_EVENTS,
        }
    }

    /// An engine preloaded with `rules`; duplicate ids keep the first rule.
    pub fn with_rules(rules: impl IntoIterator<Item = AlertRule>) -> Self {
        let mut engine = Self::new();
        for rule in rules {
            engine.add_rule(rule);
        }
        engine
    }

    /// Add a rule. Returns `false` and changes nothing if the id exists.
    pub fn add_rule(&mut self, rule: AlertRule) -> bool {
        if self.rules.iter().any(|r| r.id == rule.id) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Remove a rule by id. Returns whether anything was removed.
    pub fn remove_rule(&mut self, rule_id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != rule_id);
        self.last_fire.remove(rule_id);
        self.rules.len() < before
    }

    /// Enable or disable a rule. Returns `false` if the id is unknown.
    pub fn set_enabled(&mut self, rule_id: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Evaluate all enabled rules against `snapshot` at the current time.
    pub fn evaluate(&mut self, snapshot: &MetricsSnapshot) -> Vec<AlertEvent> {
        self.evaluate_at(snapshot, unix_timestamp())
    }

    /// Evaluate all enabled rules as if the wall clock read `now`.
    ///
    /// Returns the events fired this round, in rule order.
    pub fn evaluate_at(&mut self, snapshot: &MetricsSnapshot, now: f64) -> Vec<AlertEvent> {
        let mut fired = Vec::new();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            let Some(value) = snapshot.metric_value(&rule.metric) else {
                continue;
            };
            if !rule.operator.compare(value, rule.value) {
                continue;
            }
            if let Some(last) = self.last_fire.get(&rule.id) {
                if now - last < rule.cooldown_sec {
                    continue;
                }
            }

            self.last_fire.insert(rule.id.clone(), now);
            let event = AlertEvent {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                metric: rule.metric.clone(),
                value,
                threshold: rule.value,
                severity: rule.severity,
                message: format!("{}={:?} (threshold {} {:?})", rule.metric, value, rule.operator, rule.value),
                timestamp: now,
            };
            info!("alert {}: {}", rule.id, event.message);
            fired.push(event);
        }

        for event in &fired {
            self.events.push_back(event.clone());
            while self.events.len() > self.max_events {
                self.events.pop_front();
            }
        }
        fired
    }

    /// Up to `limit` most recent events, newest first.
    pub fn events(&self, limit: usize) -> Vec<AlertEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Drop all events and reset every cooldown.
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.last_fire.clear();
    }
}

/// The predefined rules derived from configured thresholds.
///
/// Empty when alerting is disabled.
pub fn default_rules(config: &AlertsConfig) -> Vec<AlertRule> {
    if !config.enabled {
        return Vec::new();
    }

    let cooldown = config.cooldown_sec;
    let mut rules = vec![
        AlertRule::new("cpu_high", "High CPU usage", "cpu_percent", Operator::Gte, config.cpu_percent)
            .with_cooldown(cooldown),
        AlertRule::new(
            "memory_high",
            "High memory usage",
            "memory_percent",
            Operator::Gte,
            config.memory_percent,
        )
        .with_cooldown(cooldown),
        AlertRule::new("disk_high", "Disk almost full", "disk_percent", Operator::Gte, config.disk_percent)
            .with_severity(Severity::Critical)
            .with_cooldown(cooldown),
        AlertRule::new(
            "battery_low",
            "Battery low",
            "battery_percent",
            Operator::Lte,
            config.battery_percent,
        )
        .with_cooldown(cooldown),
    ];
    if config.thermal_critical {
        rules.push(
            AlertRule::new(
                "thermal_critical",
                "Thermal pressure critical",
                "thermal_pressure",
                Operator::Gte,
                f64::from(ThermalPressure::Heavy.level()),
            )
            .with_severity(Severity::Critical)
            .with_cooldown(cooldown),
        );
    }
    rules
}
