//! Error handling for the hostpulse crate.

use std::time::Duration;

/// A specialized `Result` type for hostpulse operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// The main error type for hostpulse operations.
///
/// Collectors never return this type: their failures are encoded in a
/// [`CollectorResult`](crate::metrics::result::CollectorResult). It is used
/// by configuration loading, persistence and the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Text or value parsing failed
    #[error("Failed to parse: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// History persistence failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl MonitorError {
    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence_error(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }
}

impl From<figment::Error> for MonitorError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Failure modes of an external tool invocation.
///
/// All of these are soft failures: collectors log them and move on to the
/// next tool or sampler configuration.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The executable is not installed or not on `PATH`
    #[error("{0}: not installed")]
    NotFound(String),

    /// The tool did not finish within its time budget
    #[error("{program}: timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The tool ran but exited unsuccessfully
    #[error("{program}: exited with status {status:?}")]
    Failed { program: String, status: Option<i32> },

    /// Spawning or waiting failed (e.g. permission denied)
    #[error("{program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Whether this failure means the tool is simply absent on this host.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
