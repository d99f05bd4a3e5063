//! Structured logging setup using the `tracing` ecosystem.
//!
//! Configures a `tracing-subscriber` with either JSON output (for
//! production) or pretty-printed output (for TTY / local dev). Format
//! is auto-detected from the terminal but can be forced via `--json`
//! or `--pretty`. Connection-pool and TLS chatter is capped at `warn`
//! unless the level is `trace`.

use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

const NOISY_TARGETS: [&str; 3] = ["hyper_util", "rustls", "axum_server"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[must_use]
pub fn build_filter(level: Level) -> Targets {
    // More verbose levels compare greater: TRACE > DEBUG > ... > ERROR.
    let noisy_level = if level == Level::TRACE {
        level
    } else {
        Level::WARN.min(level)
    };
    NOISY_TARGETS
        .iter()
        .fold(Targets::new().with_default(level), |filter, target| {
            filter.with_target(*target, noisy_level)
        })
}

/// Errors become Sentry events and warnings become breadcrumbs. Without an
/// initialized Sentry client the layer drops everything.
#[cfg(feature = "sentry-integration")]
fn sentry_layer<S>() -> Option<sentry_tracing::SentryLayer<S>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    Some(sentry_tracing::layer())
}

#[cfg(not(feature = "sentry-integration"))]
const fn sentry_layer() -> Option<tracing_subscriber::layer::Identity> {
    None
}

pub fn init(level: &LogLevel, format: LogFormat) {
    let filter = build_filter(level.to_tracing_level());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false))
                .with(sentry_layer())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .with(sentry_layer())
                .init();
        }
    }
}
