//! Startup configuration for the proxy.
//!
//! [`ProxyConfig`] is built once from the `run` arguments and then shared
//! read-only through [`AppState`](crate::server::AppState). Nothing in it
//! changes while the server runs.

use axum::http::uri::PathAndQuery;
use axum::http::Uri;
use url::Url;

use crate::error::ProxyError;

/// Schema name injected into every metadata field when none is configured.
pub const DEFAULT_SCHEMA_NAME: &str = "SO_Auto_Extraction_Schema";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub target: ProxyTarget,
    pub schema_name: String,
}

/// The single upstream base URL every request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    url: Url,
}

impl ProxyTarget {
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let invalid = |reason: &str| ProxyError::InvalidTarget {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed"));
        }
        Ok(Self { url })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Join the inbound path and query onto the target's base path.
    ///
    /// `https://api/v1` + `/extract?x=1` becomes `https://api/v1/extract?x=1`.
    pub fn upstream_uri(&self, inbound: Option<&PathAndQuery>) -> Result<Uri, ProxyError> {
        let base = self.url.path().trim_end_matches('/');
        let (path, query) = inbound.map_or(("/", None), |pq| (pq.path(), pq.query()));

        let mut joined = String::with_capacity(self.url.as_str().len() + path.len());
        joined.push_str(self.url.scheme());
        joined.push_str("://");
        joined.push_str(self.authority().as_str());
        joined.push_str(base);
        if !path.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(path);
        if let Some(query) = query {
            joined.push('?');
            joined.push_str(query);
        }

        joined.parse::<Uri>().map_err(|e| ProxyError::UriParse {
            source: Box::new(e),
        })
    }

    /// `host[:port]` as it belongs in the outbound `Host` header.
    #[must_use]
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        self.url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"))
    }
}

impl std::fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}
