//! Shared TLS certificate introspection for the https/smtp/imap probes.

use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

/// Connect to `host:port`, complete a direct TLS handshake and return the
/// number of whole days until the leaf certificate's `notAfter`, and its
/// SHA-256 public-key pin (hex) for optional pinning.
pub async fn min_cert_days(host: &str, port: u16, timeout: Duration) -> Result<(i64, String), String> {
    let connect = async {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| e.to_string())?;
        let tls_stream = handshake(host, stream).await?;
        cert_days_and_pin(&tls_stream)
    };

    tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| "TLS handshake timed out".to_string())?
}

/// Complete a TLS handshake over an already-connected stream (used after a
/// plaintext STARTTLS upgrade by the smtp/imap probes).
pub async fn handshake<S>(host: &str, stream: S) -> Result<TlsStream<S>, String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connector = build_connector();
    let server_name = ServerName::try_from(host.to_string()).map_err(|e| format!("invalid server name: {e}"))?;
    connector.connect(server_name, stream).await.map_err(|e| e.to_string())
}

/// Extract `(days-until-expiry, sha256-pubkey-pin)` from a completed TLS
/// session's leaf certificate.
pub fn cert_days_and_pin<S>(tls_stream: &TlsStream<S>) -> Result<(i64, String), String> {
    let (_, session) = tls_stream.get_ref();
    let certs = session.peer_certificates().ok_or_else(|| "no peer certificate presented".to_string())?;
    let leaf = certs.first().ok_or_else(|| "empty certificate chain".to_string())?;
    let (_, parsed) =
        x509_parser::parse_x509_certificate(leaf.as_ref()).map_err(|e| format!("failed to parse certificate: {e}"))?;
    let not_after = parsed.validity().not_after.timestamp();
    let now = chrono::Utc::now().timestamp();
    let days = (not_after - now) / 86_400;
    let pin = sha2_hex_pin(parsed.public_key().raw);
    Ok((days, pin))
}

fn build_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
        let _ = roots.add(cert);
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

fn sha2_hex_pin(der: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(der);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
