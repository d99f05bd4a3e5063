//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared, read-only state holding the
//! proxy config, HTTP client, stats, and uptime), [`build_router`] for
//! constructing the Axum router with middleware layers,
//! [`build_http_client`] for the connection-pooled hyper client, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::BoxError;
use crate::health::health_handler;
use crate::proxy;

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub rejected: AtomicU64,
    pub failed: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

/// Outbound request body: a buffered passthrough body or a streamed
/// multipart body.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, ProxyBody>;

pub struct AppState {
    pub config: ProxyConfig,
    pub http_client: HttpClient,
    pub start_time: Instant,
    pub max_body: usize,
    pub stats: Stats,
}

impl AppState {
    #[must_use]
    pub fn new(config: ProxyConfig, max_body: usize) -> Self {
        Self {
            config,
            http_client: build_http_client(),
            start_time: Instant::now(),
            max_body,
            stats: Stats::new(),
        }
    }
}

/// Install `ring` as the process-wide rustls provider. Both the upstream
/// client and the HTTPS listener need it; repeated calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    install_crypto_provider();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body = state.max_body;
    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy::forward_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body))
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
