use hyper::header::{self, HeaderValue};
use hyper::http::uri::{self, PathAndQuery};
use hyper::{Request, Uri};

use crate::config::{ProxyConfig, ProxyMode};
use crate::error::GatewayError;
use crate::models::{RouteKind, UpstreamTarget};

/// Chooses the upstream for a request and points the request at it
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingDirector;

impl RoutingDirector {
    /// Create a new director
    pub fn new() -> Self {
        Self
    }

    /// Backend when `path` starts with a configured chaos route prefix.
    /// An empty prefix matches every path.
    pub fn classify(path: &str, config: &ProxyConfig) -> RouteKind {
        let is_backend = config
            .chaos_routes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()));

        if is_backend {
            RouteKind::Backend
        } else {
            RouteKind::Frontend
        }
    }

    /// Raw target string for a route; may be empty
    pub fn resolve<'a>(kind: RouteKind, config: &'a ProxyConfig) -> &'a str {
        let target = match (config.mode, kind) {
            (ProxyMode::Unified, _) => &config.target_unified,
            (ProxyMode::Split, RouteKind::Backend) => &config.target_backend,
            (ProxyMode::Split, RouteKind::Frontend) => &config.target_frontend,
        };
        target.trim()
    }

    /// Rewrite the request's scheme, authority and `Host` header to the
    /// resolved target.
    ///
    /// Returns `Ok(None)` and leaves the request untouched when no target
    /// is configured for this route.
    pub fn direct<B>(
        &self,
        request: &mut Request<B>,
        kind: RouteKind,
        config: &ProxyConfig,
    ) -> Result<Option<UpstreamTarget>, GatewayError> {
        let raw = Self::resolve(kind, config);
        if raw.is_empty() {
            tracing::warn!(route = %kind, mode = ?config.mode, "No upstream target for route");
            return Ok(None);
        }

        let target = UpstreamTarget::parse(raw)?;

        let path_and_query = request
            .uri()
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        let mut parts = uri::Parts::default();
        parts.scheme = Some(target.scheme.clone());
        parts.authority = Some(target.authority.clone());
        parts.path_and_query = Some(path_and_query);

        let upstream_uri = Uri::from_parts(parts)
            .map_err(|e| GatewayError::InvalidTarget(format!("{}: {}", target, e)))?;
        let host = HeaderValue::from_str(target.host_header())
            .map_err(|e| GatewayError::InvalidTarget(format!("{}: {}", target, e)))?;

        *request.uri_mut() = upstream_uri;
        request.headers_mut().insert(header::HOST, host);

        tracing::debug!(route = %kind, upstream = %request.uri(), "Request directed");
        Ok(Some(target))
    }
}
