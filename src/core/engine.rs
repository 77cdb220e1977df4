use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::upgrade::OnUpgrade;
use hyper::{Body, Client, Request, Response, StatusCode};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::chaos::{RandomSource, ShapingProfile, StreamShaper};
use crate::config::{ConfigStore, ProxyConfig};
use crate::core::director::RoutingDirector;
use crate::core::response;
use crate::error::{GatewayError, ShapeError};
use crate::middleware::{ResponseMutator, RuleEngine};
use crate::models::RouteKind;
use crate::monitor::{CompletionRecorder, RequestMonitor, RequestRecord, Tamper};
use crate::utils::{is_upgrade_request, is_upgrade_response, strip_hop_headers};

/// Runs one request through the chaos pipeline:
/// rule check, then forward, header mutation and body shaping.
///
/// Every stage works from the single config snapshot it is handed.
#[derive(Debug)]
pub struct ProxyEngine {
    director: RoutingDirector,
    rules: RuleEngine,
    mutator: ResponseMutator,
    client: Client<HttpConnector, Body>,
    random: Arc<dyn RandomSource>,
    monitor: Arc<RequestMonitor>,
    upstream_timeout: Duration,
}

impl ProxyEngine {
    /// Create a new engine. `upstream_timeout` bounds the wait for upstream
    /// response headers.
    pub fn new(
        random: Arc<dyn RandomSource>,
        monitor: Arc<RequestMonitor>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            director: RoutingDirector::new(),
            rules: RuleEngine::new(random.clone()),
            mutator: ResponseMutator::new(random.clone()),
            client: Client::builder().build_http(),
            random,
            monitor,
            upstream_timeout,
        }
    }

    pub fn monitor(&self) -> &Arc<RequestMonitor> {
        &self.monitor
    }

    pub async fn process(
        &self,
        request: Request<Body>,
        kind: RouteKind,
        config: &ProxyConfig,
        started: Instant,
    ) -> Response<Body> {
        let record = RequestRecord {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            status_code: 0,
            duration: Duration::ZERO,
            tamper: Tamper::clean(),
        };

        if let Some(decision) = self.rules.evaluate(&record.path, config) {
            let response = response::short_circuit(&decision, &config.header_rules);
            self.record_now(record, response.status(), decision.tamper(), started);
            return response;
        }

        match self.forward(request, kind, config, record.clone(), started).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, path = %record.path, route = %kind, "Proxy request failed");
                let response = response::error(&err);
                self.record_now(record, response.status(), Tamper::classify(config), started);
                response
            }
        }
    }

    async fn forward(
        &self,
        mut request: Request<Body>,
        kind: RouteKind,
        config: &ProxyConfig,
        record: RequestRecord,
        started: Instant,
    ) -> Result<Response<Body>, GatewayError> {
        let client_upgrade = if is_upgrade_request(request.headers()) {
            Some(hyper::upgrade::on(&mut request))
        } else {
            None
        };

        let target = self
            .director
            .direct(&mut request, kind, config)?
            .ok_or(GatewayError::UpstreamUnresolved(kind))?;

        if client_upgrade.is_none() {
            strip_hop_headers(request.headers_mut());
        }

        let profile = ShapingProfile::request(config);
        let shaped_upload = !profile.is_passthrough();
        let uploaded = if request.body().is_end_stream() {
            // nothing to shape, so request lag is paid up front
            if !profile.first_byte_delay.is_zero() {
                tokio::time::sleep(profile.first_byte_delay).await;
            }
            None
        } else {
            let (done_tx, done_rx) = oneshot::channel();
            let (parts, body) = request.into_parts();
            let upload = UploadStream {
                inner: StreamShaper::new(body, profile, self.random.clone()).into_stream(),
                done: Some(done_tx),
            };
            request = Request::from_parts(parts, Body::wrap_stream(upload));
            Some(done_rx)
        };

        tracing::debug!(upstream = %target, shaped_upload, "Forwarding request");
        let mut upstream_response = self.send_upstream(request, uploaded).await?;

        let upgrade_requested = client_upgrade.is_some();
        if is_upgrade_response(&upstream_response, upgrade_requested) {
            if let Some(client_upgrade) = client_upgrade {
                if upstream_response.status() == StatusCode::SWITCHING_PROTOCOLS {
                    let upstream_upgrade = hyper::upgrade::on(&mut upstream_response);
                    tokio::spawn(
                        tunnel(client_upgrade, upstream_upgrade)
                            .instrument(tracing::info_span!("tunnel", path = %record.path)),
                    );
                }
            }
            self.record_now(record, upstream_response.status(), Tamper::clean(), started);
            return Ok(upstream_response);
        }

        self.mutator
            .mutate_response(&mut upstream_response, &config.header_rules, upgrade_requested);
        strip_hop_headers(upstream_response.headers_mut());

        let recorder = CompletionRecorder::new(
            self.monitor.clone(),
            RequestRecord {
                status_code: upstream_response.status().as_u16(),
                tamper: Tamper::classify(config),
                ..record
            },
            started,
        );

        let (parts, body) = upstream_response.into_parts();
        let mut shaped =
            StreamShaper::new(body, ShapingProfile::response(config), self.random.clone())
                .into_stream();

        // the head goes out with the first shaped chunk, so TTFB delays the
        // status line too; a disconnect here drops the recorder and logs
        let first = shaped.next().await;
        let tracked = TrackedStream {
            inner: stream::iter(first).chain(shaped).boxed(),
            _recorder: recorder,
        };

        Ok(Response::from_parts(parts, Body::wrap_stream(tracked)))
    }

    /// Send the request and wait for the upstream response head.
    ///
    /// The header deadline starts only once the request body has been fully
    /// handed to the upstream, so shaped uploads never count against it.
    async fn send_upstream(
        &self,
        request: Request<Body>,
        uploaded: Option<oneshot::Receiver<()>>,
    ) -> Result<Response<Body>, GatewayError> {
        let response = self.client.request(request);
        tokio::pin!(response);

        if let Some(uploaded) = uploaded {
            tokio::select! {
                result = &mut response => return Ok(result?),
                _ = uploaded => {}
            }
        }

        tokio::time::timeout(self.upstream_timeout, response)
            .await
            .map_err(|_| GatewayError::RequestTimeout)?
            .map_err(GatewayError::from)
    }

    fn record_now(&self, record: RequestRecord, status: StatusCode, tamper: Tamper, started: Instant) {
        self.monitor.record(RequestRecord {
            status_code: status.as_u16(),
            duration: started.elapsed(),
            tamper,
            ..record
        });
    }
}

/// Shaped request body that signals once it has been fully read
struct UploadStream {
    inner: BoxStream<'static, Result<Bytes, ShapeError>>,
    done: Option<oneshot::Sender<()>>,
}

impl Stream for UploadStream {
    type Item = Result<Bytes, ShapeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(self.inner.poll_next_unpin(cx));
        if item.is_none() {
            if let Some(done) = self.done.take() {
                let _ = done.send(());
            }
        }
        Poll::Ready(item)
    }
}

/// Shaped response body that logs the request once it is dropped
struct TrackedStream {
    inner: BoxStream<'static, Result<Bytes, ShapeError>>,
    _recorder: CompletionRecorder,
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, ShapeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Splice an upgraded client connection onto the upgraded upstream one
async fn tunnel(client: OnUpgrade, upstream: OnUpgrade) {
    let (mut client, mut upstream) = match futures::future::try_join(client, upstream).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(error = %e, "Protocol upgrade failed");
            return;
        }
    };

    tracing::debug!("Tunnel opened");
    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((to_upstream, to_client)) => {
            tracing::debug!(to_upstream, to_client, "Tunnel closed");
        }
        Err(e) => {
            tracing::debug!(error = %e, "Tunnel closed with error");
        }
    }
}

/// Entry point for inbound proxy traffic
#[derive(Debug)]
pub struct ChaosHandler {
    store: ConfigStore,
    engine: ProxyEngine,
}

impl ChaosHandler {
    /// Create a new handler reading configuration from `store`
    pub fn new(store: ConfigStore, engine: ProxyEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<RequestMonitor> {
        self.engine.monitor()
    }

    /// Handle one inbound request against a fresh config snapshot
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let started = Instant::now();
        let config = self.store.get().await;
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        if !config.is_configured() {
            let err = GatewayError::NotConfigured;
            tracing::warn!(method = %method, path = %path, "{}", err);
            let response = response::error(&err);
            self.engine.monitor().record(RequestRecord {
                method: method.to_string(),
                path,
                status_code: response.status().as_u16(),
                duration: started.elapsed(),
                tamper: Tamper::clean(),
            });
            return response;
        }

        let kind = RoutingDirector::classify(&path, &config);
        let span = tracing::info_span!("chaos_request", method = %method, path = %path, route = %kind);

        self.engine
            .process(request, kind, &config, started)
            .instrument(span)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::ScriptedRandom;
    use crate::config::{MockRule, StatusRule};

    fn handler(config: ProxyConfig) -> ChaosHandler {
        let random: Arc<dyn RandomSource> = Arc::new(ScriptedRandom::constant(99));
        let monitor = Arc::new(RequestMonitor::new());
        let engine = ProxyEngine::new(random, monitor, Duration::from_secs(5));
        ChaosHandler::new(ConfigStore::with_config(config), engine)
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_not_configured_returns_503() {
        let handler = handler(ProxyConfig::default());
        let response = handler.handle(get("/anything")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let logs = handler.monitor().get_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, 503);
        assert!(!logs[0].tampered);
    }

    #[tokio::test]
    async fn test_status_rule_short_circuits() {
        let handler = handler(ProxyConfig {
            // nothing listens here; a forwarded request would fail with 502
            target_frontend: "http://127.0.0.1:9".to_string(),
            lag_to_resp: 500,
            status_rules: vec![StatusRule {
                id: String::new(),
                path_pattern: "/api".to_string(),
                status_code: 418,
                error_rate: 100,
            }],
            ..Default::default()
        });

        let response = handler.handle(get("/api/teapot")).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

        let logs = handler.monitor().get_logs();
        assert_eq!(logs[0].tamper_type, "INJECT 418");
        assert_eq!(logs[0].method, "GET");
        assert_eq!(logs[0].path, "/api/teapot");
    }

    #[tokio::test]
    async fn test_mock_rule_short_circuits() {
        let handler = handler(ProxyConfig {
            target_frontend: "http://127.0.0.1:9".to_string(),
            mock_rules: vec![MockRule {
                id: String::new(),
                path_pattern: "/users".to_string(),
                body: r#"[{"id":1}]"#.to_string(),
                active: true,
            }],
            ..Default::default()
        });

        let response = handler.handle(get("/users/1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"[{"id":1}]"#);
        assert_eq!(handler.monitor().get_logs()[0].tamper_type, "MOCK");
    }

    #[tokio::test]
    async fn test_missing_route_target_is_502() {
        let handler = handler(ProxyConfig {
            target_frontend: "http://127.0.0.1:9".to_string(),
            chaos_routes: vec!["/api".to_string()],
            ..Default::default()
        });

        let response = handler.handle(get("/api/x")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(handler.monitor().get_logs()[0].status_code, 502);
    }
}
