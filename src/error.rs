//! Unified error types for the extraction proxy.
//!
//! [`ProxyError`] covers startup failures (bad target URL, TLS files,
//! listener errors) and the per-request failures of the multipart
//! pipeline. Request errors map onto an HTTP status through
//! [`ProxyError::status`] so the handler can answer the client with a
//! diagnostic instead of dropping the connection.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("TLS requires both --tls-cert and --tls-key")]
    IncompleteTls,

    #[error("TLS file not found: {}", path.display())]
    TlsFileNotFound { path: PathBuf },

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: BoxError,
    },

    #[error("Malformed multipart body: {source}")]
    Decode {
        #[source]
        source: BoxError,
    },

    #[error("Field '{field}' is not valid JSON: {source}")]
    FieldParse {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Field '{field}' must be a JSON object")]
    NotAnObject { field: String },

    #[error("Failed to read request body: {source}")]
    Body {
        #[source]
        source: BoxError,
    },

    #[error("Request body exceeds the configured limit: {source}")]
    PayloadTooLarge {
        #[source]
        source: BoxError,
    },

    #[error("Upstream request failed: {source}")]
    Upstream {
        #[source]
        source: BoxError,
    },

    #[error("Outbound body aborted: {0}")]
    Aborted(String),

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: BoxError,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

impl ProxyError {
    /// Status code reported to the client when this error ends a request.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Decode { .. }
            | Self::FieldParse { .. }
            | Self::NotAnObject { .. }
            | Self::Body { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream { .. } | Self::Aborted(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures caused by the client's payload rather than the proxy
    /// or the upstream.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::FieldParse { .. }
                | Self::NotAnObject { .. }
                | Self::Body { .. }
                | Self::PayloadTooLarge { .. }
        )
    }
}

/// True when `err` or anything in its source chain is a body length limit
/// violation raised by `http_body_util::Limited`.
#[must_use]
pub fn is_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(err), |e| e.source()).any(|e| e.is::<LengthLimitError>())
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), format!("{self}\n")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_parse_is_bad_request() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProxyError::FieldParse {
            field: "meta".into(),
            source,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.is_rejection());
        assert!(err.to_string().starts_with("Field 'meta' is not valid JSON"));
    }

    #[test]
    fn upstream_failure_is_bad_gateway() {
        let err = ProxyError::Upstream {
            source: "connection refused".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(!err.is_rejection());
    }

    async fn length_limit_error() -> BoxError {
        use http_body_util::{BodyExt, Full, Limited};

        Limited::new(Full::new(bytes::Bytes::from_static(b"too long")), 2)
            .collect()
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn length_limit_is_found_in_source_chain() {
        let direct = length_limit_error().await;
        assert!(is_length_limit(&*direct));

        let wrapped = axum::Error::new(length_limit_error().await);
        assert!(is_length_limit(&wrapped));

        let other = std::io::Error::other("connection reset");
        assert!(!is_length_limit(&other));
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() {
        let err = ProxyError::PayloadTooLarge {
            source: length_limit_error().await,
        };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.is_rejection());
    }

    #[test]
    fn interrupted_body_is_bad_request() {
        let err = ProxyError::Body {
            source: "client went away".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
