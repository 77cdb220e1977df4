pub mod director;
pub mod engine;
pub mod gateway;
pub mod response;

pub use director::RoutingDirector;
pub use engine::{ChaosHandler, ProxyEngine};
pub use gateway::{ChaosGateway, Gateway};
