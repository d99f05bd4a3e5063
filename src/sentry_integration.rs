//! Optional Sentry error tracking integration.
//!
//! Initializes the Sentry SDK and tags every event with the upstream
//! target and schema name. The returned guard must be held for the
//! lifetime of the application so errors and panics are flushed.

use crate::config::ProxyConfig;

pub fn init(
    dsn: &str,
    environment: Option<&str>,
    config: &ProxyConfig,
) -> sentry::ClientInitGuard {
    let parsed_dsn = dsn
        .parse::<sentry::types::Dsn>()
        .map_err(|e| tracing::warn!(error = %e, "invalid Sentry DSN, error tracking disabled"))
        .ok();

    let guard = sentry::init(sentry::ClientOptions {
        dsn: parsed_dsn,
        environment: environment.map(|e| e.to_string().into()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("upstream", config.target.to_string());
        scope.set_tag("schema_name", &config.schema_name);
    });

    guard
}
