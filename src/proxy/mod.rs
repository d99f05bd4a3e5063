//! Core request forwarding handler.
//!
//! [`forward_handler`] is the Axum fallback that receives every
//! non-`/health` request. Multipart requests go through [`decode`],
//! [`transform`] and [`encode`] before being streamed upstream by
//! [`pipe`]; any other body is forwarded untouched. The upstream
//! response is streamed back by [`relay`].

pub mod decode;
pub mod encode;
pub mod headers;
pub mod pipe;
pub mod relay;
pub mod transform;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Full};

use crate::error::{is_length_limit, ProxyError};
use crate::server::{AppState, ProxyBody};
use encode::EncodedForm;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Case-sensitive substring match on the raw `Content-Type` value.
#[must_use]
pub fn is_multipart(content_type: &str) -> bool {
    content_type.contains(MULTIPART_FORM_DATA)
}

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::info!(
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
        "request received"
    );

    match proxy_request(&state, addr, request, &correlation_id).await {
        Ok(response) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                correlation_id = %correlation_id,
                status = response.status().as_u16(),
                "upstream responded"
            );
            response
        }
        Err(e) => {
            if e.is_rejection() {
                state.stats.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    correlation_id = %correlation_id,
                    method = %method,
                    path = %path,
                    error = %e,
                    "request rejected"
                );
            } else {
                state.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    correlation_id = %correlation_id,
                    method = %method,
                    path = %path,
                    error = %e,
                    "proxying failed"
                );
            }
            let mut response = e.into_response();
            if let Ok(val) = HeaderValue::from_str(&correlation_id) {
                response.headers_mut().insert("x-correlation-id", val);
            }
            response
        }
    }
}

async fn proxy_request(
    state: &AppState,
    addr: SocketAddr,
    request: Request,
    correlation_id: &str,
) -> Result<Response, ProxyError> {
    let target = &state.config.target;
    let uri = target.upstream_uri(request.uri().path_and_query())?;
    let method = request.method().clone();
    let client_ip = addr.ip().to_string();
    let mut outbound_headers =
        headers::build_forwarded_headers(request.headers(), &client_ip, target, correlation_id);

    let multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_multipart);

    let upstream = if multipart {
        // Everything that can reject the request happens before the first
        // outbound byte.
        let form = decode::decode(request).await?;
        let form = transform::transform(form, &state.config.schema_name)?;
        let encoded = EncodedForm::encode(&form);
        let content_length = encoded.content_length();
        if content_length.is_none() {
            tracing::warn!(
                correlation_id = %correlation_id,
                "body length not computable, sending chunked"
            );
        }
        headers::set_body_headers(&mut outbound_headers, &encoded.content_type(), content_length);

        tracing::debug!(
            correlation_id = %correlation_id,
            fields = form.fields.len(),
            files = form.files.len(),
            content_length = ?content_length,
            "forwarding rewritten multipart body"
        );

        let head = outbound_head(method, uri, outbound_headers);
        let chunks = encoded.into_chunks().into_iter().map(Ok::<_, Infallible>);
        pipe::forward(&state.http_client, head, content_length, chunks).await?
    } else {
        let body = axum::body::to_bytes(request.into_body(), state.max_body)
            .await
            .map_err(|e| {
                if is_length_limit(&e) {
                    ProxyError::PayloadTooLarge {
                        source: Box::new(e),
                    }
                } else {
                    ProxyError::Body {
                        source: Box::new(e),
                    }
                }
            })?;

        tracing::debug!(
            correlation_id = %correlation_id,
            bytes = body.len(),
            "forwarding body unchanged"
        );

        let head = outbound_head(method, uri, outbound_headers);
        let body: ProxyBody = Full::new(body).map_err(|never| match never {}).boxed();
        state
            .http_client
            .request(hyper::Request::from_parts(head, body))
            .await
            .map_err(|e| ProxyError::Upstream {
                source: Box::new(e),
            })?
    };

    Ok(relay::relay(upstream, correlation_id))
}

fn outbound_head(method: Method, uri: Uri, headers: HeaderMap) -> Parts {
    let (mut head, ()) = hyper::Request::new(()).into_parts();
    head.method = method;
    head.uri = uri;
    head.headers = headers;
    head
}
