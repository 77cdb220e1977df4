use thiserror::Error;

use crate::models::RouteKind;

/// Boxed error used for body streams coming from either side of the proxy
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Chaos proxy not configured: set an upstream target first")]
    NotConfigured,

    #[error("No upstream target configured for {0} route")]
    UpstreamUnresolved(RouteKind),

    #[error("Invalid upstream target: {0}")]
    InvalidTarget(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] hyper::Error),

    #[error("Upstream request timeout")]
    RequestTimeout,

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// HTTP status code mapping for gateway errors
impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotConfigured => 503,
            GatewayError::UpstreamUnresolved(_) => 502,
            GatewayError::InvalidTarget(_) => 502,
            GatewayError::Upstream(_) => 502,
            GatewayError::RequestTimeout => 504,
            GatewayError::ConfigError(_) => 500,
            GatewayError::InternalError(_) => 500,
            GatewayError::IoError(_) => 500,
        }
    }
}

/// Configuration specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Malformed configuration document: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Errors surfaced by a shaped body stream
#[derive(Debug, Error)]
pub enum ShapeError {
    /// Injected `close_body` failure: the stream ends before the upstream did
    #[error("unexpected end of body")]
    Truncated,

    /// The wrapped stream itself failed
    #[error("body stream error: {0}")]
    Body(BoxError),
}
