use std::sync::Arc;

use tokio::signal;

use chaos_proxy::chaos::{RandomSource, SeededRandom, ThreadRandom};
use chaos_proxy::config::{ConfigStore, Settings};
use chaos_proxy::core::{ChaosGateway, Gateway};
use chaos_proxy::error::GatewayError;
use chaos_proxy::middleware::init_tracing;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    let settings = Settings::from_env()?;
    init_tracing(&settings.logging);

    let store = ConfigStore::new();
    if let Some(path) = &settings.initial_config {
        store.load_from_file(path).await?;
    }

    let random: Arc<dyn RandomSource> = match settings.seed {
        Some(seed) => {
            tracing::info!(seed, "Using seeded chaos random source");
            Arc::new(SeededRandom::new(seed))
        }
        None => Arc::new(ThreadRandom),
    };

    let gateway = ChaosGateway::new(settings.server.clone(), store, random);

    let addr = gateway.start().await?;
    tracing::info!(%addr, "Chaos proxy started successfully");

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping chaos proxy");

    gateway.stop().await?;
    tracing::info!("Chaos proxy stopped successfully");

    Ok(())
}
