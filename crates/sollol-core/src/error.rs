//! Error Types

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Inbound payload cannot be analyzed
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No node satisfies the selection constraints
    #[error("No capacity: {0}")]
    NoCapacity(String),

    /// A selected node returned an error (recoverable per-attempt)
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// All routing attempts failed
    #[error("Upstream exhausted after {attempts} attempts: {last}")]
    UpstreamExhausted { attempts: u32, last: String },

    /// Deadline passed while waiting on an upstream
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// GGUF resolver cannot locate the requested model
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Coordinator failed to start or become ready within its timeout
    #[error("Coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),

    /// Caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Stable kind string used in structured error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::NoCapacity(_) => "no_capacity",
            GatewayError::Upstream(_) => "upstream_failure",
            GatewayError::UpstreamExhausted { .. } => "upstream_exhausted",
            GatewayError::UpstreamTimeout(_) => "upstream_timeout",
            GatewayError::ModelNotFound(_) => "model_not_found",
            GatewayError::CoordinatorUnavailable(_) => "coordinator_unavailable",
            GatewayError::Cancelled => "cancelled",
            GatewayError::Config(_) => "config",
            GatewayError::Io(_) => "io",
            GatewayError::Json(_) => "json",
        }
    }

    /// Check if the router may retry this error on another node
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Upstream(_) | GatewayError::UpstreamTimeout(_) | GatewayError::Io(_)
        )
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}
