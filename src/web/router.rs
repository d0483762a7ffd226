//! Web application router and middleware setup.

use crate::error::Result;
use crate::monitor::MonitorState;
use crate::web::config::WebConfig;
use crate::web::handlers;
use axum::{
    http::HeaderValue,
    routing::{delete, get},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Create the axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, state: MonitorState) -> Result<Router> {
    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
        .route("/metrics/prometheus", get(handlers::get_prometheus))
        .route("/alerts/events", get(handlers::list_events))
        .route("/alerts/rules", get(handlers::list_rules).post(handlers::create_rule))
        .route("/alerts/rules/:id", delete(handlers::delete_rule))
        .route("/history", get(handlers::get_history))
        .with_state(state);

    if config.enable_cors {
        app = app.layer(cors_layer(config));
    }

    Ok(app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
}

fn cors_layer(config: &WebConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertEngine, AlertRule, Operator};
    use crate::history::HistoryBuffer;
    use crate::metrics::MetricsSnapshot;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> MonitorState {
        let rule = AlertRule::new("cpu", "CPU", "cpu_percent", Operator::Gte, 90.0);
        MonitorState::new(AlertEngine::with_rules([rule]), HistoryBuffer::new(10))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_app(&WebConfig::default(), state()).unwrap();
        let (status, body) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_before_first_poll() {
        let app = create_app(&WebConfig::default(), state()).unwrap();
        let (status, _) = send(app, get("/metrics")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_and_prometheus_serve_latest() {
        let state = state();
        state
            .set_latest(MetricsSnapshot {
                cpu_percent: 33.0,
                ..Default::default()
            })
            .await;
        let app = create_app(&WebConfig::default(), state).unwrap();

        let (status, body) = send(app.clone(), get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["cpu_percent"], 33.0);
        assert!(json["error"].is_null());

        let (status, body) = send(app, get("/metrics/prometheus")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("hostpulse_cpu_percent 33\n"));
    }

    #[tokio::test]
    async fn test_rule_lifecycle() {
        let app = create_app(&WebConfig::default(), state()).unwrap();
        let rule = r#"{"id":"mem","name":"Memory","metric":"memory_percent","operator":"gte","value":80.0}"#;
        let post = || {
            Request::builder()
                .method("POST")
                .uri("/alerts/rules")
                .header("content-type", "application/json")
                .body(Body::from(rule))
                .unwrap()
        };

        let (status, _) = send(app.clone(), post()).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(app.clone(), post()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = send(app.clone(), get("/alerts/rules")).await;
        let rules: Vec<AlertRule> = serde_json::from_str(&body).unwrap();
        assert_eq!(rules.len(), 2);

        let delete = |uri: &str| Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap();
        let (status, _) = send(app.clone(), delete("/alerts/rules/mem")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app, delete("/alerts/rules/mem")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_and_history() {
        let state = state();
        let snapshot = MetricsSnapshot {
            cpu_percent: 95.0,
            ..Default::default()
        };
        state.alerts().lock().await.evaluate_at(&snapshot, 10.0);
        state.history().lock().await.append(snapshot);
        let app = create_app(&WebConfig::default(), state).unwrap();

        let (_, body) = send(app.clone(), get("/alerts/events?limit=5")).await;
        let events: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(events[0]["rule_id"], "cpu");
        assert_eq!(events[0]["severity"], "warning");

        let (_, body) = send(app, get("/history?limit=1")).await;
        let history: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(history["history"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_restricted_cors_origins() {
        let config = WebConfig::default().with_cors_origins(vec!["http://localhost:3000".into()]);
        assert!(create_app(&config, state()).is_ok());
    }
}
