//! TLS configuration and certificate loading.

use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tokio_rustls::TlsAcceptor;

/// ALPN offered to TLS clients; the decrypted stream always speaks HTTP/1.1.
const ALPN_HTTP1: &[u8] = b"http/1.1";

/// Load a certificate chain and key into an acceptor for sniffed TLS streams.
pub async fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, std::io::Error> {
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

    let rustls = RustlsConfig::from_pem_file(cert_path, key_path).await?;
    let mut server_config = (*rustls.get_inner()).clone();
    server_config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

    tracing::info!(cert = %cert_path.display(), "TLS certificate loaded");
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
