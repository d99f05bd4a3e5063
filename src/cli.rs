//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, health), and their associated argument structs.
//! Every `run` flag has an environment variable equivalent for container
//! deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_SCHEMA_NAME;

#[derive(Parser)]
#[command(
    name = "extraction-proxy",
    version,
    about = "Reverse proxy that rewrites multipart metadata for a document-extraction API",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        extraction-proxy run -t https://extract.example.com     Plain HTTP on :3000\n  \
        extraction-proxy health                                 Check a running instance"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        extraction-proxy run -t http://localhost:8080                       Local upstream\n  \
        extraction-proxy run -t https://api.example.com -s Invoice_Schema   Custom schema\n  \
        extraction-proxy run -t https://api.example.com \\\n    \
            --tls-cert cert.pem --tls-key key.pem -p 443                      HTTPS listener")]
pub struct RunArgs {
    /// Upstream base URL every request is forwarded to
    #[arg(short, long, env = "PROXY_TARGET")]
    pub target: String,

    /// Schema name injected into every multipart metadata field
    #[arg(short, long, env = "SCHEMA_NAME", default_value = DEFAULT_SCHEMA_NAME)]
    pub schema_name: String,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- TLS --
    /// PEM certificate chain; enables HTTPS together with --tls-key
    #[arg(long, env = "TLS_CERT", help_heading = "TLS")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key (unencrypted)
    #[arg(long, env = "TLS_KEY", help_heading = "TLS")]
    pub tls_key: Option<PathBuf>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Observability --
    /// Sentry DSN (enables error tracking)
    #[cfg(feature = "sentry-integration")]
    #[arg(long, env = "SENTRY_DSN", help_heading = "Observability")]
    pub sentry_dsn: Option<String>,

    /// Sentry environment tag
    #[cfg(feature = "sentry-integration")]
    #[arg(long, env = "SENTRY_ENVIRONMENT", help_heading = "Observability")]
    pub sentry_environment: Option<String>,

    // -- Tuning --
    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 50 * 1024 * 1024,
        help_heading = "Tuning"
    )]
    pub max_body: usize,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}
