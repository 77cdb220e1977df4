use std::sync::Arc;

use crate::chaos::RandomSource;
use crate::config::ProxyConfig;
use crate::monitor::Tamper;

/// Synthetic answer that replaces the upstream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortCircuit {
    /// A status rule fired
    Status { code: u16 },

    /// An active mock rule matched
    Mock { body: String },
}

impl ShortCircuit {
    /// Status code the client will see
    pub fn status(&self) -> u16 {
        match self {
            ShortCircuit::Status { code } => *code,
            ShortCircuit::Mock { .. } => 200,
        }
    }

    pub fn tamper(&self) -> Tamper {
        match self {
            ShortCircuit::Status { code } => Tamper::injected(*code),
            ShortCircuit::Mock { .. } => Tamper::mocked(),
        }
    }
}

/// Decides whether a request is answered without contacting the upstream.
///
/// Status rules are evaluated first, in configured order, and each one
/// whose prefix matches rolls its own error rate. Active mock rules come
/// after and match on prefix alone.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    random: Arc<dyn RandomSource>,
}

impl RuleEngine {
    /// Create a new rule engine drawing rolls from `random`
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    pub fn evaluate(&self, path: &str, config: &ProxyConfig) -> Option<ShortCircuit> {
        for rule in &config.status_rules {
            if !path.starts_with(rule.path_pattern.as_str()) {
                continue;
            }
            if self.random.chance(u64::from(rule.error_rate)) {
                tracing::info!(
                    path = %path,
                    pattern = %rule.path_pattern,
                    status = rule.status_code,
                    "Status rule triggered"
                );
                return Some(ShortCircuit::Status {
                    code: rule.status_code,
                });
            }
        }

        let mock = config
            .mock_rules
            .iter()
            .find(|rule| rule.active && path.starts_with(rule.path_pattern.as_str()))?;

        tracing::info!(path = %path, pattern = %mock.path_pattern, "Mock rule matched");
        Some(ShortCircuit::Mock {
            body: mock.body.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::ScriptedRandom;
    use crate::config::{MockRule, StatusRule};

    fn status_rule(pattern: &str, code: u16, rate: u8) -> StatusRule {
        StatusRule {
            id: String::new(),
            path_pattern: pattern.to_string(),
            status_code: code,
            error_rate: rate,
        }
    }

    fn mock_rule(pattern: &str, body: &str, active: bool) -> MockRule {
        MockRule {
            id: String::new(),
            path_pattern: pattern.to_string(),
            body: body.to_string(),
            active,
        }
    }

    fn engine(rolls: Vec<u64>, fallback: u64) -> RuleEngine {
        RuleEngine::new(Arc::new(ScriptedRandom::new(rolls, fallback)))
    }

    #[test]
    fn test_no_rules_passes_through() {
        let engine = engine(vec![], 0);
        assert_eq!(engine.evaluate("/api/users", &ProxyConfig::default()), None);
    }

    #[test]
    fn test_full_error_rate_always_fires() {
        let config = ProxyConfig {
            status_rules: vec![status_rule("/api", 503, 100)],
            ..Default::default()
        };
        let engine = engine(vec![], 99);

        for _ in 0..100 {
            assert_eq!(
                engine.evaluate("/api/orders", &config),
                Some(ShortCircuit::Status { code: 503 })
            );
        }
        assert_eq!(engine.evaluate("/home", &config), None);
    }

    #[test]
    fn test_zero_error_rate_never_fires() {
        let config = ProxyConfig {
            status_rules: vec![status_rule("/api", 500, 0)],
            ..Default::default()
        };
        let engine = engine(vec![], 0);
        assert_eq!(engine.evaluate("/api", &config), None);
    }

    #[test]
    fn test_first_triggering_rule_wins() {
        let config = ProxyConfig {
            status_rules: vec![status_rule("/api", 500, 50), status_rule("/api/v1", 429, 50)],
            ..Default::default()
        };
        // first rule misses (roll 70), second fires (roll 10)
        let engine = engine(vec![70, 10], 99);
        assert_eq!(
            engine.evaluate("/api/v1/items", &config),
            Some(ShortCircuit::Status { code: 429 })
        );
    }

    #[test]
    fn test_status_rules_take_precedence_over_mocks() {
        let config = ProxyConfig {
            status_rules: vec![status_rule("/api", 418, 100)],
            mock_rules: vec![mock_rule("/api", "{}", true)],
            ..Default::default()
        };
        let result = engine(vec![], 0).evaluate("/api/x", &config).unwrap();
        assert_eq!(result.status(), 418);
        assert_eq!(result.tamper().kind, "INJECT 418");
    }

    #[test]
    fn test_only_active_mocks_match() {
        let config = ProxyConfig {
            mock_rules: vec![
                mock_rule("/api/users", "inactive", false),
                mock_rule("/api", r#"{"users":[]}"#, true),
            ],
            ..Default::default()
        };
        let result = engine(vec![], 0).evaluate("/api/users", &config).unwrap();
        assert_eq!(
            result,
            ShortCircuit::Mock {
                body: r#"{"users":[]}"#.to_string()
            }
        );
        assert_eq!(result.status(), 200);
        assert_eq!(result.tamper().kind, "MOCK");
    }
}
