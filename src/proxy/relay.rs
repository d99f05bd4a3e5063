//! Streaming the upstream response back to the client.
//!
//! Status, headers (minus hop-by-hop) and body bytes are passed through
//! unchanged. The body is never buffered: if the upstream stream fails
//! midway the error surfaces as a body error, and the server tears the
//! client connection down instead of ending the response cleanly.

use axum::body::Body;
use axum::http::{HeaderValue, Response};
use http_body_util::BodyExt;
use hyper::body::Incoming;

use super::headers::strip_hop_by_hop;

pub fn relay(upstream: Response<Incoming>, correlation_id: &str) -> axum::response::Response {
    let (mut parts, body) = upstream.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    if let Ok(val) = HeaderValue::from_str(correlation_id) {
        parts.headers.insert("x-correlation-id", val);
    }

    let cid = correlation_id.to_string();
    let body = body.map_err(move |e| {
        tracing::error!(
            correlation_id = %cid,
            error = %e,
            "upstream response stream failed, aborting client connection"
        );
        e
    });

    Response::from_parts(parts, Body::new(body))
}
