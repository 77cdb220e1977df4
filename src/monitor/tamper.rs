use crate::config::{FailureMode, ProxyConfig};

/// Post-hoc label describing which chaos mechanism touched a request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tamper {
    pub tampered: bool,
    pub kind: String,
}

impl Tamper {
    /// Nothing was done to the request
    pub fn clean() -> Self {
        Self::default()
    }

    fn tagged(kind: impl Into<String>) -> Self {
        Self {
            tampered: true,
            kind: kind.into(),
        }
    }

    /// Short-circuited by a status rule
    pub fn injected(status_code: u16) -> Self {
        Self::tagged(format!("INJECT {}", status_code))
    }

    /// Short-circuited by a mock rule
    pub fn mocked() -> Self {
        Self::tagged("MOCK")
    }

    /// Label for a request that went through the proxy pipeline.
    ///
    /// A failure mode wins outright; otherwise header hacks and lag are
    /// reported, combined when both are on.
    pub fn classify(config: &ProxyConfig) -> Self {
        if config.failure_mode != FailureMode::Normal {
            return Self::tagged(config.failure_mode.as_str());
        }

        match (config.header_rules.is_active(), config.has_lag()) {
            (true, true) => Self::tagged("LAG + HEADERS"),
            (true, false) => Self::tagged("HEADER HAX"),
            (false, true) => Self::tagged(format!(
                "LAG +{}ms",
                config.lag_to_req.saturating_add(config.lag_to_resp)
            )),
            (false, false) => Self::clean(),
        }
    }
}
