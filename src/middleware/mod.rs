//! Per-request chaos decisions applied around the upstream call

pub mod headers;
pub mod logging;
pub mod rules;

pub use headers::ResponseMutator;
pub use logging::init_tracing;
pub use rules::{RuleEngine, ShortCircuit};
