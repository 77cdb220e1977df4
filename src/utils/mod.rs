use std::time::Duration;

use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{Response, StatusCode};

/// Headers that only describe the current hop and must not be forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Convert a duration to milliseconds
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Whether a `Connection` header lists `token` (case-insensitive)
fn connection_has_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Whether a request asks to switch protocols (e.g. WebSocket)
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE) && connection_has_token(headers, "upgrade")
}

/// Whether a response switches protocols and must bypass shaping.
///
/// An `Upgrade` header on any other status only counts when the client asked
/// for the upgrade; servers also send it as an advisory on plain responses.
pub fn is_upgrade_response<B>(response: &Response<B>, upgrade_requested: bool) -> bool {
    response.status() == StatusCode::SWITCHING_PROTOCOLS
        || (upgrade_requested && response.headers().contains_key(header::UPGRADE))
}

/// Remove hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|t| HeaderName::from_bytes(t.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
