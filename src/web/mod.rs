//! HTTP API serving the latest snapshot, alert state and history.
//!
//! The server only reads from [`MonitorState`]; polling happens elsewhere.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{MonitorError, Result};
use crate::monitor::MonitorState;
use std::future::Future;
use tracing::info;

/// Serve the API until `shutdown` resolves.
pub async fn start_web_server<F>(config: &WebConfig, state: MonitorState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(config, state)?;

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .map_err(|e| MonitorError::web_server_error(format!("Failed to bind to address: {}", e)))?;
    let addr = listener.local_addr()?;

    info!("API listening on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);
    info!("Prometheus endpoint: http://{}/metrics/prometheus", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MonitorError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
