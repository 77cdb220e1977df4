use hyper::header::{self, HeaderValue};
use hyper::{Body, Response, StatusCode};
use serde_json::json;

use crate::config::HeaderRules;
use crate::error::GatewayError;
use crate::middleware::ShortCircuit;

const JSON: &str = "application/json";

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Render a proxy failure as `{"error": "..."}`
pub fn error(err: &GatewayError) -> Response<Body> {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "error": err.to_string() });
    with_body(status, JSON, body.to_string())
}

/// Forged error written by a status rule
pub fn injected(code: u16) -> Response<Body> {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "error": "Status Code Injection", "code": code });
    with_body(status, JSON, body.to_string())
}

/// Canned body served by a mock rule; JSON bodies are labelled as such
pub fn mocked(body: &str) -> Response<Body> {
    let content_type = if serde_json::from_str::<serde_json::Value>(body).is_ok() {
        JSON
    } else {
        PLAIN_TEXT
    };
    with_body(StatusCode::OK, content_type, body.to_owned())
}

/// Response for a rule short-circuit, honouring the CORS header rule
pub fn short_circuit(decision: &ShortCircuit, rules: &HeaderRules) -> Response<Body> {
    let mut response = match decision {
        ShortCircuit::Status { code } => injected(*code),
        ShortCircuit::Mock { body } => mocked(body),
    };

    if !rules.strip_cors {
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }
    response
}
