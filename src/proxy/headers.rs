//! Header construction, forwarding, and hop-by-hop stripping.
//!
//! [`build_forwarded_headers`] clones the inbound headers, strips
//! hop-by-hop headers, rewrites `Host` for the target, and adds proxy
//! metadata (`X-Forwarded-For`, `X-Real-IP`, `Via`, `X-Correlation-Id`).
//! [`set_body_headers`] swaps in the framing headers of a re-encoded body.

use std::sync::LazyLock;

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::ProxyTarget;

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Strip hop-by-hop headers from an upstream response.
///
/// `content-length` is kept: the body is streamed through unchanged.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

pub fn build_forwarded_headers(
    original: &HeaderMap,
    client_ip: &str,
    target: &ProxyTarget,
    correlation_id: &str,
) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);

    // The inbound body has already been read, any 100-continue was answered here.
    headers.remove("expect");

    // Rewrite Host
    if let Ok(val) = HeaderValue::from_str(&target.authority()) {
        headers.insert("host", val);
    }

    // X-Forwarded-For: append to chain
    let xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || client_ip.to_string(),
            |existing| format!("{existing}, {client_ip}"),
        );
    if let Ok(val) = HeaderValue::from_str(&xff) {
        headers.insert("x-forwarded-for", val);
    }

    // X-Real-IP (first IP in chain)
    let real_ip = xff.split(',').next().unwrap_or(client_ip).trim();
    if let Ok(val) = HeaderValue::from_str(real_ip) {
        headers.insert("x-real-ip", val);
    }

    let proto = if target.url().scheme() == "https" {
        "https"
    } else {
        "http"
    };
    headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));

    // X-Forwarded-Host (original Host the client targeted)
    if let Some(original_host) = original.get("host") {
        headers.insert("x-forwarded-host", original_host.clone());
    }

    headers.insert("via", HeaderValue::from_static("1.1 extraction-proxy"));

    if let Ok(val) = HeaderValue::from_str(correlation_id) {
        headers.insert("x-correlation-id", val);
    }

    headers
}

/// Replace the framing headers with those of a re-encoded body. Without a
/// length the body goes out chunked.
pub fn set_body_headers(headers: &mut HeaderMap, content_type: &str, content_length: Option<u64>) {
    headers.remove(CONTENT_LENGTH);
    match HeaderValue::from_str(content_type) {
        Ok(val) => {
            headers.insert(CONTENT_TYPE, val);
        }
        Err(e) => {
            tracing::warn!(error = %e, "unrepresentable content type, leaving it unset");
            headers.remove(CONTENT_TYPE);
        }
    }
    if let Some(length) = content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
}
