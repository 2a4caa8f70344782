//! TLS configuration for HTTPS interception.
//!
//! The proxy presents one pre-provisioned certificate for every intercepted
//! host; clients that do not trust it simply fail their own handshake.
//! Unmatched requests inside an intercepted tunnel are re-encrypted towards
//! the origin with the webpki root set.

use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tokio_rustls::rustls::{self, pki_types::ServerName, ClientConfig, RootCertStore};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Make sure a process-wide crypto provider is installed before building configs.
pub fn ensure_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Load the interception certificate and key into a TLS acceptor.
pub async fn load_intercept_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, std::io::Error> {
    if !cert_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        ));
    }
    if !key_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    ensure_crypto_provider();
    let config = RustlsConfig::from_pem_file(cert_path, key_path).await?;

    // The decrypted stream is served as HTTP/1.1 only.
    let mut server_config = (*config.get_inner()).clone();
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    tracing::info!(cert = ?cert_path, "Interception certificate loaded");
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Client-side TLS for re-encrypting unmatched intercepted requests.
pub fn origin_connector() -> TlsConnector {
    ensure_crypto_provider();
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    TlsConnector::from(Arc::new(config))
}

/// SNI name for an origin host.
pub fn server_name(host: &str) -> Result<ServerName<'static>, std::io::Error> {
    ServerName::try_from(host.to_string())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}
