use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use hyper::{Body, Request, Response};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::chaos::{RandomSource, ThreadRandom};
use crate::config::{ConfigStore, ServerConfig};
use crate::core::engine::{ChaosHandler, ProxyEngine};
use crate::error::GatewayError;
use crate::monitor::RequestMonitor;

/// How long `stop` waits for in-flight requests before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Core gateway trait that defines the main functionality
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Process an incoming request and return a response
    async fn process_request(&self, request: Request<Body>) -> Response<Body>;

    /// Start the gateway server, returning the bound address
    async fn start(&self) -> Result<SocketAddr, GatewayError>;

    /// Stop the gateway server
    async fn stop(&self) -> Result<(), GatewayError>;

    /// Check if the gateway is healthy
    async fn health_check(&self) -> bool;
}

/// Server state (handle and shutdown sender)
#[derive(Default)]
struct ServerState {
    server_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

/// Chaos reverse proxy listening on a single address
#[derive(Clone)]
pub struct ChaosGateway {
    config: ServerConfig,
    handler: Arc<ChaosHandler>,
    server_state: Arc<Mutex<ServerState>>,
}

impl ChaosGateway {
    /// Create a new gateway using entropy for chaos decisions
    pub fn with_config(config: ServerConfig) -> Self {
        Self::new(config, ConfigStore::new(), Arc::new(ThreadRandom))
    }

    /// Create a new gateway serving `store`'s configuration
    pub fn new(config: ServerConfig, store: ConfigStore, random: Arc<dyn RandomSource>) -> Self {
        let monitor = Arc::new(RequestMonitor::with_capacity(config.log_capacity));
        let engine = ProxyEngine::new(random, monitor, config.upstream_timeout());

        Self {
            handler: Arc::new(ChaosHandler::new(store, engine)),
            config,
            server_state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    /// Live configuration; replacing it affects requests that start afterwards
    pub fn store(&self) -> &ConfigStore {
        self.handler.store()
    }

    /// Request history
    pub fn monitor(&self) -> Arc<RequestMonitor> {
        self.handler.monitor().clone()
    }

    /// Address the listener is bound to while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server_state.lock().await.local_addr
    }

    fn router(&self) -> axum::Router {
        axum::Router::new()
            .fallback(proxy)
            .with_state(self.handler.clone())
            .layer(TraceLayer::new_for_http())
    }
}

async fn proxy(State(handler): State<Arc<ChaosHandler>>, request: Request<Body>) -> Response<Body> {
    handler.handle(request).await
}

#[async_trait]
impl Gateway for ChaosGateway {
    async fn process_request(&self, request: Request<Body>) -> Response<Body> {
        self.handler.handle(request).await
    }

    async fn start(&self) -> Result<SocketAddr, GatewayError> {
        let mut server_state = self.server_state.lock().await;
        if server_state.server_handle.is_some() {
            return Err(GatewayError::InternalError(
                "Server is already running".to_string(),
            ));
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))?;
        let server = axum::Server::from_tcp(listener)
            .map_err(|e| GatewayError::InternalError(format!("Failed to listen: {}", e)))?
            .serve(self.router().into_make_service());
        let addr = server.local_addr();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let graceful = server.with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("Shutdown signal received, starting graceful shutdown");
        });

        let server_handle = tokio::spawn(async move {
            if let Err(e) = graceful.await {
                tracing::error!("Server error: {}", e);
            }
            tracing::info!(%addr, "Chaos proxy has been shut down");
        });

        server_state.server_handle = Some(server_handle);
        server_state.shutdown_tx = Some(shutdown_tx);
        server_state.local_addr = Some(addr);

        tracing::info!(%addr, "Chaos proxy listening");
        Ok(addr)
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        let mut server_state = self.server_state.lock().await;

        let mut handle = server_state
            .server_handle
            .take()
            .ok_or_else(|| GatewayError::InternalError("Server is not running".to_string()))?;
        server_state.local_addr = None;

        if let Some(tx) = server_state.shutdown_tx.take() {
            // We don't care if the receiver is dropped
            let _ = tx.send(());
        }

        // hung bodies never finish on their own
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(())) => {
                tracing::info!("Server has been shut down gracefully");
                Ok(())
            }
            Ok(Err(e)) => Err(GatewayError::InternalError(format!(
                "Error while shutting down server: {}",
                e
            ))),
            Err(_) => {
                tracing::warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "In-flight requests still open, aborting server"
                );
                handle.abort();
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.server_state
            .lock()
            .await
            .server_handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}
