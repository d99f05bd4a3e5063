//! A reverse proxy in front of a document-extraction API.
//!
//! Every inbound `multipart/form-data` request has each text field parsed
//! as a JSON object, `schemaName` forced to the configured value and
//! `extraction` removed. The form is then re-encoded and streamed to a
//! single fixed upstream. Any other body is forwarded byte-for-byte, and
//! the upstream response is streamed back unchanged.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, health).
//! - [`config`] -- The immutable [`ProxyConfig`](config::ProxyConfig) and
//!   upstream [`ProxyTarget`](config::ProxyTarget).
//! - [`error`] -- Unified error type using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- Core forwarding: multipart decoding, metadata rewriting,
//!   re-encoding, the streaming upstream pipe, and the response relay.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//! - [`tls`] -- Certificate loading for the optional HTTPS listener.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `sentry-integration` | Sentry error tracking |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod tls;

#[cfg(feature = "sentry-integration")]
pub mod sentry_integration;
