// TLS acceptor for serving the API over HTTPS
//
// Certificates are plain PEM files, typically issued by an external ACME
// client and dropped next to the binary.

use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// Picks HTTPS only when both paths are configured and both files exist.
///
/// Configured but missing files fall back to plain HTTP with a warning;
/// files that exist but fail to parse are an error.
pub fn acceptor_for(cert_path: Option<&Path>, key_path: Option<&Path>) -> Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (Some(cert), Some(key)) => (cert, key),
        (None, None) => return Ok(None),
        _ => {
            warn!("Only one of TLS_CERT_PATH / TLS_KEY_PATH is set, serving plain HTTP");
            return Ok(None);
        }
    };

    if !cert_path.exists() || !key_path.exists() {
        warn!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            "TLS files not found, serving plain HTTP"
        );
        return Ok(None);
    }

    load_acceptor(cert_path, key_path).map(Some)
}

/// Create a TLS acceptor from certificate and key files
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Failed to create TLS server config")?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "Loaded TLS certificate"
    );

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Load certificates from a PEM file
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open certificate file {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to parse certificates")?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in {}", path.display());
    }

    Ok(certs)
}

/// Load the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open private key file {}", path.display()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .context("Failed to parse private key")?
        .with_context(|| format!("No private key found in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("timeclock-tls-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn unset_paths_mean_plain_http() {
        assert!(acceptor_for(None, None).unwrap().is_none());
        assert!(acceptor_for(Some(Path::new("/tmp/cert.pem")), None).unwrap().is_none());
    }

    #[test]
    fn missing_files_fall_back() {
        let acceptor = acceptor_for(
            Some(Path::new("/nonexistent/timeclock/cert.pem")),
            Some(Path::new("/nonexistent/timeclock/key.pem")),
        )
        .unwrap();
        assert!(acceptor.is_none());
    }

    #[test]
    fn unparseable_files_are_an_error() {
        let cert = scratch("cert.pem", "not a certificate");
        let key = scratch("key.pem", "not a key");
        assert!(acceptor_for(Some(cert.as_path()), Some(key.as_path())).is_err());
        let _ = std::fs::remove_file(cert);
        let _ = std::fs::remove_file(key);
    }
}
