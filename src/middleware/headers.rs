use std::sync::Arc;

use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::Response;

use crate::chaos::RandomSource;
use crate::config::HeaderRules;
use crate::utils::is_upgrade_response;

const CORS_PREFIX: &str = "access-control-";

const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Plausible but wrong content type
const WRONG_CONTENT_TYPE: &str = "text/plain";

/// Content type no client knows how to decode
const BROKEN_CONTENT_TYPE: &str = "application/broken-octet-stream";

/// Rewrites response headers according to the configured header rules
#[derive(Debug, Clone)]
pub struct ResponseMutator {
    random: Arc<dyn RandomSource>,
}

impl ResponseMutator {
    /// Create a new mutator drawing rolls from `random`
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Mutate a proxied response in place. Protocol-upgrade responses are
    /// left untouched.
    pub fn mutate_response<B>(
        &self,
        response: &mut Response<B>,
        rules: &HeaderRules,
        upgrade_requested: bool,
    ) {
        if is_upgrade_response(response, upgrade_requested) {
            tracing::debug!("Skipping header mutation for upgrade response");
            return;
        }
        self.apply_headers(response.headers_mut(), rules);
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap, rules: &HeaderRules) {
        if rules.strip_cors {
            strip_cors(headers);
        } else if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        }

        if rules.strip_cache {
            headers.remove(header::ETAG);
            headers.remove(header::LAST_MODIFIED);
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        }

        if rules.corrupt_content_type {
            // coin flip between a wrong type and a broken one
            let value = if self.random.chance(50) {
                WRONG_CONTENT_TYPE
            } else {
                BROKEN_CONTENT_TYPE
            };
            tracing::debug!(content_type = value, "Corrupting Content-Type");
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        }
    }
}

fn strip_cors(headers: &mut HeaderMap) {
    let cors: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(CORS_PREFIX))
        .cloned()
        .collect();

    for name in cors {
        headers.remove(name);
    }
}
