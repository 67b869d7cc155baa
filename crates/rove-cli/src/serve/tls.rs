//! TLS material loading.

use crate::error::ServeError;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::{
    self,
    pki_types::{CertificateDer, PrivateKeyDer},
    ServerConfig,
};
use tokio_rustls::TlsAcceptor;

fn invalid(reason: String) -> ServeError {
    ServeError::InvalidTlsMaterial { reason }
}

fn open(path: &Path, what: &str) -> Result<BufReader<File>, ServeError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| invalid(format!("cannot read {} {}: {}", what, path.display(), e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServeError> {
    let mut reader = open(path, "certificate")?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(format!("failed to parse certificate {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(invalid(format!(
            "no PEM certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from `path`.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServeError> {
    let mut reader = open(path, "key")?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| invalid(format!("failed to parse key {}: {}", path.display(), e)))?
        .ok_or_else(|| {
            invalid(format!(
                "no supported private key found in {} (expecting PKCS#8, RSA or EC)",
                path.display()
            ))
        })
}

/// Build a server config from a PEM key and certificate chain.
///
/// ALPN advertises h2 and http/1.1.
pub fn load_server_config(key: &Path, cert: &Path) -> Result<Arc<ServerConfig>, ServeError> {
    let certs = load_certs(cert)?;
    let key = load_private_key(key)?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| invalid(format!("unsupported protocol configuration: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| invalid(format!("certificate and key do not match: {}", e)))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

pub fn make_tls_acceptor(key: &Path, cert: &Path) -> Result<TlsAcceptor, ServeError> {
    Ok(TlsAcceptor::from(load_server_config(key, cert)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files() {
        let temp = TempDir::new().unwrap();
        let err = load_server_config(&temp.path().join("key.pem"), &temp.path().join("cert.pem"))
            .unwrap_err();
        assert!(matches!(err, ServeError::InvalidTlsMaterial { .. }));
        assert!(err.to_string().contains("cert.pem"));
    }

    #[test]
    fn test_garbage_certificate() {
        let temp = TempDir::new().unwrap();
        let cert = temp.path().join("cert.pem");
        let key = temp.path().join("key.pem");
        fs::write(&cert, "not a certificate").unwrap();
        fs::write(&key, "not a key").unwrap();

        let err = load_server_config(&key, &cert).unwrap_err();
        assert!(err.to_string().contains("no PEM certificates"));
    }

    #[test]
    fn test_missing_key_block() {
        let temp = TempDir::new().unwrap();
        let cert = temp.path().join("cert.pem");
        let key = temp.path().join("key.pem");
        fs::write(
            &cert,
            "-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----\n",
        )
        .unwrap();
        fs::write(&key, "").unwrap();

        let err = load_server_config(&key, &cert).unwrap_err();
        assert!(err.to_string().contains("no supported private key"));
    }
}
