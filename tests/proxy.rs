//! End-to-end tests: a real proxy in front of a recording mock upstream.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use serde_json::{json, Value};

use http_body_util::BodyExt;

use extraction_proxy::config::{ProxyConfig, ProxyTarget, DEFAULT_SCHEMA_NAME};
use extraction_proxy::error::BoxError;
use extraction_proxy::health::HealthResponse;
use extraction_proxy::proxy::decode::{decode, FormData};
use extraction_proxy::proxy::pipe;
use extraction_proxy::server::{self, AppState, ProxyBody};

#[derive(Debug, Clone)]
struct Captured {
    method: String,
    path_and_query: String,
    headers: HeaderMap,
    body: Bytes,
}

type Recorder = Arc<Mutex<Vec<Captured>>>;

async fn record(State(recorder): State<Recorder>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    recorder.lock().unwrap().push(Captured {
        method: parts.method.to_string(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(ToString::to_string)
            .unwrap_or_default(),
        headers: parts.headers,
        body,
    });

    (
        StatusCode::CREATED,
        [("x-upstream", "mock")],
        "upstream-ok",
    )
        .into_response()
}

/// Declares 100 bytes, sends 10, then fails the stream.
async fn broken_stream() -> Response {
    let (sender, body) = pipe::channel(4, Some(100));
    tokio::spawn(async move {
        let _ = sender.send(Bytes::from_static(b"0123456789")).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sender.abort("upstream storage failed".into()).await;
    });
    Response::builder()
        .status(StatusCode::OK)
        .header("content-length", "100")
        .body(Body::new(body))
        .unwrap()
}

async fn start_upstream() -> (SocketAddr, Recorder) {
    let recorder: Recorder = Arc::default();
    let router = Router::new()
        .route("/api/broken", any(broken_stream))
        .fallback(record)
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, recorder)
}

async fn start_proxy(target: &str) -> SocketAddr {
    start_proxy_with_limit(target, 10 * 1024 * 1024).await
}

async fn start_proxy_with_limit(target: &str, max_body: usize) -> SocketAddr {
    let config = ProxyConfig {
        target: ProxyTarget::parse(target).unwrap(),
        schema_name: DEFAULT_SCHEMA_NAME.into(),
    };
    let state = Arc::new(AppState::new(config, max_body));
    let router = server::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn start_pair() -> (SocketAddr, Recorder) {
    let (upstream, recorder) = start_upstream().await;
    let proxy = start_proxy(&format!("http://{upstream}/api")).await;
    (proxy, recorder)
}

async fn decode_captured(captured: &Captured) -> FormData {
    let mut request = Request::new(Body::from(captured.body.clone()));
    *request.headers_mut() = captured.headers.clone();
    decode(request).await.unwrap()
}

/// POST `body` in 1 KiB frames with no `Content-Length`, so it goes out
/// chunked and only the streaming limit can stop it.
async fn post_chunked(url: &str, content_type: &str, body: Vec<u8>) -> StatusCode {
    let (sender, pipe_body) = pipe::channel(4, None);
    let pipe_body: ProxyBody = pipe_body.map_err(|e| -> BoxError { Box::new(e) }).boxed();
    let request = hyper::Request::post(url)
        .header("content-type", content_type)
        .body(pipe_body)
        .unwrap();

    tokio::spawn(async move {
        for chunk in body.chunks(1024) {
            if sender.send(Bytes::copy_from_slice(chunk)).await.is_err() {
                return;
            }
        }
        let _ = sender.finish().await;
    });

    server::build_http_client()
        .request(request)
        .await
        .unwrap()
        .status()
}

async fn fetch_health(proxy: SocketAddr) -> HealthResponse {
    reqwest::get(format!("http://{proxy}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn sample_pdf() -> Vec<u8> {
    (0..1024u32).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn multipart_metadata_is_rewritten() {
    let (proxy, recorder) = start_pair().await;

    let form = reqwest::multipart::Form::new()
        .text("meta", r#"{"extraction":"foo","user":"bob"}"#)
        .part(
            "doc",
            reqwest::multipart::Part::bytes(sample_pdf())
                .file_name("invoice.pdf")
                .mime_str("application/pdf")
                .unwrap(),
        );

    let resp = reqwest::Client::new()
        .post(format!("http://{proxy}/extract?async=true"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201);
    assert_eq!(resp.headers().get("x-upstream").unwrap(), "mock");
    assert!(resp.headers().get("x-correlation-id").is_some());
    assert_eq!(resp.text().await.unwrap(), "upstream-ok");

    let captured = recorder.lock().unwrap()[0].clone();
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path_and_query, "/api/extract?async=true");

    let forwarded = decode_captured(&captured).await;
    assert_eq!(forwarded.fields.len(), 1);
    assert_eq!(forwarded.fields[0].name, "meta");
    let meta: Value = serde_json::from_str(&forwarded.fields[0].value).unwrap();
    assert_eq!(
        meta,
        json!({"user": "bob", "schemaName": "SO_Auto_Extraction_Schema"})
    );

    assert_eq!(forwarded.files.len(), 1);
    let file = &forwarded.files[0];
    assert_eq!(file.field_name, "doc");
    assert_eq!(file.file_name, "invoice.pdf");
    assert_eq!(file.content_type, "application/pdf");
    assert_eq!(&file.bytes[..], &sample_pdf()[..]);
}

#[tokio::test]
async fn content_length_matches_forwarded_body() {
    let (proxy, recorder) = start_pair().await;

    let form = reqwest::multipart::Form::new()
        .text("meta", r#"{"schemaName":"Old"}"#)
        .text("options", r#"{"pages":[1,2]}"#);

    let resp = reqwest::Client::new()
        .post(format!("http://{proxy}/extract"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let captured = recorder.lock().unwrap()[0].clone();
    let content_length: usize = captured
        .headers
        .get("content-length")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(content_length, captured.body.len());
    assert!(captured
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("multipart/form-data; boundary=extraction-proxy-"));

    let forwarded = decode_captured(&captured).await;
    for field in &forwarded.fields {
        let value: Value = serde_json::from_str(&field.value).unwrap();
        assert_eq!(value["schemaName"], DEFAULT_SCHEMA_NAME);
    }
}

#[tokio::test]
async fn non_multipart_body_is_forwarded_unchanged() {
    let (proxy, recorder) = start_pair().await;

    let resp = reqwest::Client::new()
        .put(format!("http://{proxy}/documents/7"))
        .header("content-type", "application/json")
        .body(r#"{"a":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let captured = recorder.lock().unwrap()[0].clone();
    assert_eq!(captured.method, "PUT");
    assert_eq!(captured.path_and_query, "/api/documents/7");
    assert_eq!(&captured.body[..], br#"{"a":1}"#);
    assert_eq!(
        captured.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(captured.headers.get("via").unwrap(), "1.1 extraction-proxy");
}

#[tokio::test]
async fn invalid_json_field_is_rejected_before_forwarding() {
    let (proxy, recorder) = start_pair().await;

    let form = reqwest::multipart::Form::new()
        .text("good", "{}")
        .text("meta", "{not json")
        .part(
            "doc",
            reqwest::multipart::Part::bytes(sample_pdf()).file_name("invoice.pdf"),
        );

    let resp = reqwest::Client::new()
        .post(format!("http://{proxy}/extract"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body = resp.text().await.unwrap();
    assert!(body.contains("'meta'"), "{body}");
    assert!(recorder.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_multipart_is_rejected() {
    let (proxy, recorder) = start_pair().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{proxy}/extract"))
        .header("content-type", "multipart/form-data; boundary=abc")
        .body("--abc\r\nContent-Disposition: form-data; name=\"meta\"\r\n\r\n{}")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    assert!(recorder.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_upstream_returns_502() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let proxy = start_proxy(&format!("http://{dead}")).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{proxy}/extract"))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn upstream_stream_failure_aborts_client_response() {
    let (proxy, _recorder) = start_pair().await;

    let resp = reqwest::get(format!("http://{proxy}/broken")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.bytes().await.is_err());
}

#[tokio::test]
async fn oversized_chunked_bodies_get_413() {
    let (upstream, recorder) = start_upstream().await;
    let proxy = start_proxy_with_limit(&format!("http://{upstream}/api"), 1024).await;

    let mut multipart = b"--b\r\n\
        Content-Disposition: form-data; name=\"doc\"; filename=\"big.bin\"\r\n\
        Content-Type: application/octet-stream\r\n\r\n"
        .to_vec();
    multipart.extend_from_slice(&[0x5A; 8 * 1024]);
    multipart.extend_from_slice(b"\r\n--b--\r\n");

    let status = post_chunked(
        &format!("http://{proxy}/extract"),
        "multipart/form-data; boundary=b",
        multipart,
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let status = post_chunked(
        &format!("http://{proxy}/documents"),
        "application/octet-stream",
        vec![0x5A; 8 * 1024],
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let health = fetch_health(proxy).await;
    assert_eq!(health.stats.requests_rejected, 2);
    assert_eq!(health.stats.requests_forwarded, 0);
    assert_eq!(health.stats.requests_failed, 0);
    assert!(recorder.lock().unwrap().is_empty());
}
