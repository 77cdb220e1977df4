use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Proxy listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 picks a free port)
    pub port: u16,

    /// Seconds to wait for upstream response headers
    pub upstream_timeout: u64,

    /// Number of request log entries kept by the monitor
    pub log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            upstream_timeout: 30,
            log_capacity: crate::monitor::DEFAULT_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Whether to log in JSON format
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Process level settings, fixed for the lifetime of the proxy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,

    pub logging: LoggingConfig,

    /// Seed for the chaos random source; entropy when unset
    pub seed: Option<u64>,

    /// JSON chaos configuration installed at startup
    pub initial_config: Option<PathBuf>,
}

impl Settings {
    /// Defaults overridden by `CHAOS_PROXY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(host) = lookup("CHAOS_PROXY_HOST") {
            settings.server.host = host;
        }
        if let Some(port) = lookup("CHAOS_PROXY_PORT") {
            settings.server.port = parse_var("CHAOS_PROXY_PORT", &port)?;
        }
        if let Some(timeout) = lookup("CHAOS_PROXY_UPSTREAM_TIMEOUT") {
            settings.server.upstream_timeout = parse_var("CHAOS_PROXY_UPSTREAM_TIMEOUT", &timeout)?;
        }
        if let Some(capacity) = lookup("CHAOS_PROXY_LOG_CAPACITY") {
            settings.server.log_capacity = parse_var("CHAOS_PROXY_LOG_CAPACITY", &capacity)?;
        }
        if let Some(level) = lookup("CHAOS_PROXY_LOG_LEVEL") {
            settings.logging.level = level;
        }
        if let Some(json) = lookup("CHAOS_PROXY_LOG_JSON") {
            settings.logging.json_format = matches!(json.as_str(), "1" | "true" | "yes");
        }
        if let Some(seed) = lookup("CHAOS_PROXY_SEED") {
            settings.seed = Some(parse_var("CHAOS_PROXY_SEED", &seed)?);
        }
        settings.initial_config = lookup("CHAOS_PROXY_CONFIG").map(PathBuf::from);

        if settings.server.log_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "CHAOS_PROXY_LOG_CAPACITY must be at least 1".to_string(),
            ));
        }

        Ok(settings)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{}={}: {}", key, raw, e)))
}
