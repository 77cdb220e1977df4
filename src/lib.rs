// Chaos Proxy Library

pub mod chaos;
pub mod config;
pub mod core;
pub mod error;
pub mod middleware;
pub mod models;
pub mod monitor;
pub mod utils;

// Re-export commonly used types
pub use chaos::{RandomSource, ScriptedRandom, SeededRandom, ShapingProfile, StreamShaper, ThreadRandom};
pub use config::{ConfigStore, FailureMode, HeaderRules, MockRule, ProxyConfig, ProxyMode, Settings, StatusRule};
pub use core::{ChaosGateway, ChaosHandler, Gateway, ProxyEngine, RoutingDirector};
pub use error::{ConfigError, GatewayError, ShapeError};
pub use middleware::{ResponseMutator, RuleEngine, ShortCircuit};
pub use models::{RouteKind, UpstreamTarget};
pub use monitor::{LogEntry, RequestMonitor, Tamper};
