//! HTTPS listener configuration.
//!
//! Loads a PEM certificate chain and private key into an `axum-server`
//! [`RustlsConfig`]. Encrypted private keys are not supported; decrypt
//! them before handing them to the proxy.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

use crate::error::ProxyError;
use crate::server::install_crypto_provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsPaths {
    /// Both paths or neither: a lone certificate or key is a configuration
    /// error rather than a silent fallback to plain HTTP.
    pub fn from_args(cert: Option<PathBuf>, key: Option<PathBuf>) -> Result<Option<Self>, ProxyError> {
        match (cert, key) {
            (Some(cert), Some(key)) => Ok(Some(Self { cert, key })),
            (None, None) => Ok(None),
            _ => Err(ProxyError::IncompleteTls),
        }
    }
}

fn require_file(path: &Path) -> Result<(), ProxyError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProxyError::TlsFileNotFound {
            path: path.to_path_buf(),
        })
    }
}

pub async fn load_tls_config(paths: &TlsPaths) -> Result<RustlsConfig, ProxyError> {
    require_file(&paths.cert)?;
    require_file(&paths.key)?;

    install_crypto_provider();
    let config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;
    tracing::info!(
        cert = %paths.cert.display(),
        key = %paths.key.display(),
        "TLS certificate loaded"
    );
    Ok(config)
}
