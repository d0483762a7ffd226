//! HTTP handlers for API endpoints.

use crate::alerts::{AlertEvent, AlertRule};
use crate::metrics::MetricsSnapshot;
use crate::monitor::MonitorState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write;
use tracing::info;

/// Prefix for exported gauge names.
pub const PROMETHEUS_PREFIX: &str = "hostpulse";

const DEFAULT_EVENT_LIMIT: usize = 100;
const DEFAULT_HISTORY_LIMIT: usize = 300;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "no snapshot collected yet" })),
    )
        .into_response()
}

/// Latest snapshot as JSON.
pub async fn get_metrics(State(state): State<MonitorState>) -> Response {
    match state.latest().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => not_ready(),
    }
}

/// Latest snapshot as Prometheus text.
pub async fn get_prometheus(State(state): State<MonitorState>) -> Response {
    match state.latest().await {
        Some(snapshot) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            render_prometheus(&snapshot),
        )
            .into_response(),
        None => not_ready(),
    }
}

pub async fn list_events(
    State(state): State<MonitorState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<AlertEvent>> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Json(state.alerts().lock().await.events(limit))
}

pub async fn list_rules(State(state): State<MonitorState>) -> Json<Vec<AlertRule>> {
    Json(state.alerts().lock().await.rules().to_vec())
}

pub async fn create_rule(State(state): State<MonitorState>, Json(rule): Json<AlertRule>) -> Response {
    let id = rule.id.clone();
    if state.alerts().lock().await.add_rule(rule.clone()) {
        info!("added alert rule {}", id);
        (StatusCode::CREATED, Json(rule)).into_response()
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({ "error": format!("rule {} already exists", id) })),
        )
            .into_response()
    }
}

pub async fn delete_rule(State(state): State<MonitorState>, Path(id): Path<String>) -> StatusCode {
    if state.alerts().lock().await.remove_rule(&id) {
        info!("removed alert rule {}", id);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Recent snapshots, oldest first, as `{"history": [...]}`.
pub async fn get_history(
    State(state): State<MonitorState>,
    Query(query): Query<LimitQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state.history().lock().await.recent(limit);
    Json(json!({ "history": history }))
}

/// Render the headline gauges in the Prometheus text exposition format.
///
/// The battery gauge is omitted on hosts without a battery.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut gauges = vec![
        ("cpu_percent", "CPU usage percent", Some(snapshot.cpu_percent)),
        ("memory_percent", "Memory usage percent", Some(snapshot.memory_percent)),
        ("disk_percent", "Disk usage percent", Some(snapshot.disk_percent)),
        ("battery_percent", "Battery percent", snapshot.battery_percent),
    ];
    if let Some(level) = snapshot.thermal_pressure {
        gauges.push((
            "thermal_pressure_level",
            "Thermal pressure level (0 nominal to 4 critical)",
            Some(f64::from(level.level())),
        ));
    }

    let mut out = String::new();
    for (name, help, value) in gauges {
        let Some(value) = value else {
            continue;
        };
        let _ = writeln!(out, "# HELP {}_{} {}", PROMETHEUS_PREFIX, name, help);
        let _ = writeln!(out, "# TYPE {}_{} gauge", PROMETHEUS_PREFIX, name);
        let _ = writeln!(out, "{}_{} {}", PROMETHEUS_PREFIX, name, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ThermalPressure;

    #[test]
    fn test_prometheus_without_battery() {
        let snapshot = MetricsSnapshot {
            cpu_percent: 12.5,
            memory_percent: 40.0,
            disk_percent: 71.25,
            ..Default::default()
        };
        let text = render_prometheus(&snapshot);
        assert!(text.contains("# TYPE hostpulse_cpu_percent gauge\nhostpulse_cpu_percent 12.5\n"));
        assert!(text.contains("hostpulse_memory_percent 40\n"));
        assert!(text.contains("hostpulse_disk_percent 71.25\n"));
        assert!(!text.contains("battery"));
        assert!(!text.contains("thermal"));
    }

    #[test]
    fn test_prometheus_with_battery_and_thermal() {
        let snapshot = MetricsSnapshot {
            battery_percent: Some(64.0),
            thermal_pressure: Some(ThermalPressure::Heavy),
            ..Default::default()
        };
        let text = render_prometheus(&snapshot);
        assert!(text.contains("hostpulse_battery_percent 64\n"));
        assert!(text.contains("hostpulse_thermal_pressure_level 3\n"));
    }
}
