// Models for the chaos proxy

use std::fmt;

use hyper::http::uri::{Authority, Scheme};
use hyper::Uri;

use crate::error::GatewayError;

/// Logical route a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Anything not matching a chaos route prefix
    Frontend,

    /// Paths matching one of the configured chaos route prefixes
    Backend,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::Frontend => f.write_str("frontend"),
            RouteKind::Backend => f.write_str("backend"),
        }
    }
}

/// Upstream base address a request is forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    /// Upstream scheme (only `http` is dialled)
    pub scheme: Scheme,

    /// Upstream host and optional port
    pub authority: Authority,
}

impl UpstreamTarget {
    /// Parse an upstream base URL such as `http://localhost:3000`.
    ///
    /// Any path on the base URL is ignored; requests keep their own path.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let uri: Uri = raw
            .trim()
            .parse()
            .map_err(|e| GatewayError::InvalidTarget(format!("{}: {}", raw, e)))?;

        let parts = uri.into_parts();
        match (parts.scheme, parts.authority) {
            (Some(scheme), Some(authority)) => Ok(Self { scheme, authority }),
            _ => Err(GatewayError::InvalidTarget(format!(
                "{}: expected an absolute URL like http://host:port",
                raw
            ))),
        }
    }

    /// Value to send as the upstream `Host` header
    pub fn host_header(&self) -> &str {
        self.authority.as_str()
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}
