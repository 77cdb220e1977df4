pub mod settings;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::UpstreamTarget;

pub use settings::{LoggingConfig, ServerConfig, Settings};
pub use store::ConfigStore;

/// How upstream targets are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Frontend and backend routes go to different targets
    #[default]
    #[serde(alias = "")]
    Split,

    /// Every request goes to `target_unified`
    Unified,
}

/// Simulated connection failure applied to response streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    #[serde(alias = "")]
    Normal,

    /// Response TTFB is forced to [`FailureMode::TIMEOUT_DELAY_MS`]
    Timeout,

    /// Each response chunk has a 1% chance of stalling forever
    HangBody,

    /// Each response chunk has a 1% chance of ending the body early
    CloseBody,
}

impl FailureMode {
    /// TTFB forced onto responses in `timeout` mode
    pub const TIMEOUT_DELAY_MS: u64 = 60_000;

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::Normal => "normal",
            FailureMode::Timeout => "timeout",
            FailureMode::HangBody => "hang_body",
            FailureMode::CloseBody => "close_body",
        }
    }

    /// Whether this mode rolls for a failure on every streamed chunk
    pub fn injects_body_faults(&self) -> bool {
        matches!(self, FailureMode::HangBody | FailureMode::CloseBody)
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forge a status code for matching paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRule {
    /// Opaque key assigned by the dashboard
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Path prefix the rule applies to
    pub path_pattern: String,

    /// Status code written instead of proxying
    pub status_code: u16,

    /// Trigger probability in percent (0-100)
    #[serde(default)]
    pub error_rate: u8,
}

/// Serve a canned body for matching paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    pub path_pattern: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub active: bool,
}

/// Response header tampering switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderRules {
    #[serde(rename = "stripCORS")]
    pub strip_cors: bool,
    pub strip_cache: bool,
    pub corrupt_content_type: bool,
}

impl HeaderRules {
    pub fn is_active(&self) -> bool {
        self.strip_cors || self.strip_cache || self.corrupt_content_type
    }
}

/// The chaos configuration. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    #[serde(alias = "Mode")]
    pub mode: ProxyMode,

    #[serde(alias = "TargetFrontend")]
    pub target_frontend: String,

    #[serde(alias = "TargetBackend")]
    pub target_backend: String,

    #[serde(alias = "TargetUnified")]
    pub target_unified: String,

    /// Path prefixes classified as backend routes
    #[serde(alias = "ChaosRoutes")]
    pub chaos_routes: Vec<String>,

    /// Request body TTFB delay (ms)
    #[serde(alias = "LagToReq")]
    pub lag_to_req: u64,

    /// Response body TTFB delay (ms)
    #[serde(alias = "LagToResp")]
    pub lag_to_resp: u64,

    /// Request body cap in KB/s, 0 = unlimited
    pub bandwidth_up: u64,

    /// Response body cap in KB/s, 0 = unlimited
    pub bandwidth_down: u64,

    /// Upper bound (exclusive, ms) of the random delay added per read
    pub jitter: u64,

    pub failure_mode: FailureMode,

    pub status_rules: Vec<StatusRule>,

    pub header_rules: HeaderRules,

    pub mock_rules: Vec<MockRule>,
}

impl ProxyConfig {
    /// Whether the active mode has at least one target to forward to
    pub fn is_configured(&self) -> bool {
        match self.mode {
            ProxyMode::Unified => !self.target_unified.trim().is_empty(),
            ProxyMode::Split => {
                !self.target_frontend.trim().is_empty() || !self.target_backend.trim().is_empty()
            }
        }
    }

    /// Whether any request or response lag is configured
    pub fn has_lag(&self) -> bool {
        self.lag_to_req > 0 || self.lag_to_resp > 0
    }

    /// Check the values an administrative update may carry
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, raw) in [
            ("targetFrontend", &self.target_frontend),
            ("targetBackend", &self.target_backend),
            ("targetUnified", &self.target_unified),
        ] {
            if raw.trim().is_empty() {
                continue;
            }
            let target = UpstreamTarget::parse(raw)
                .map_err(|e| ConfigError::ValidationError(format!("{}: {}", name, e)))?;
            if target.scheme.as_str() != "http" {
                return Err(ConfigError::ValidationError(format!(
                    "{}: only http:// upstreams are supported, got {}",
                    name, target
                )));
            }
        }

        for rule in &self.status_rules {
            if rule.error_rate > 100 {
                return Err(ConfigError::ValidationError(format!(
                    "status rule for '{}' has errorRate {} (max 100)",
                    rule.path_pattern, rule.error_rate
                )));
            }
            if !(100..=999).contains(&rule.status_code) {
                return Err(ConfigError::ValidationError(format!(
                    "status rule for '{}' has invalid statusCode {}",
                    rule.path_pattern, rule.status_code
                )));
            }
        }

        Ok(())
    }
}
