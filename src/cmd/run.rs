//! `extraction-proxy run`: start the proxy server.
//!
//! Builds the immutable [`ProxyConfig`] from the arguments, then serves
//! the Axum router over plain HTTP or, when a certificate and key are
//! given, over HTTPS through `axum-server`. Both listeners shut down
//! gracefully on SIGTERM / Ctrl+C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::{ProxyConfig, ProxyTarget};
use crate::error::ProxyError;
use crate::logging;
use crate::server::{self, AppState};
use crate::tls::{self, TlsPaths};

/// How long in-flight requests get to finish on the HTTPS listener.
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub async fn execute(args: RunArgs) -> Result<(), ProxyError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = ProxyConfig {
        target: ProxyTarget::parse(&args.target)?,
        schema_name: args.schema_name.clone(),
    };

    #[cfg(feature = "sentry-integration")]
    let _sentry_guard = args.sentry_dsn.as_ref().map(|dsn| {
        crate::sentry_integration::init(dsn, args.sentry_environment.as_deref(), &config)
    });

    let tls_paths = TlsPaths::from_args(args.tls_cert.clone(), args.tls_key.clone())?;
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let target = config.target.to_string();
    let state = Arc::new(AppState::new(config, args.max_body));
    let service = server::build_router(state).into_make_service_with_connect_info::<SocketAddr>();

    if let Some(paths) = tls_paths {
        let rustls_config = tls::load_tls_config(&paths).await?;
        let handle = axum_server::Handle::new();

        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            server::shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
        });

        tracing::info!(
            addr = %addr,
            scheme = "https",
            upstream = %target,
            schema_name = %args.schema_name,
            "extraction-proxy started"
        );

        axum_server::bind_rustls(addr, rustls_config)
            .handle(handle)
            .serve(service)
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!(
            addr = %addr,
            scheme = "http",
            upstream = %target,
            schema_name = %args.schema_name,
            "extraction-proxy started"
        );

        axum::serve(listener, service)
            .with_graceful_shutdown(server::shutdown_signal())
            .await?;
    }

    tracing::info!("extraction-proxy stopped");
    Ok(())
}
