//! TLS decorator for the device socket.

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_native_tls::native_tls::{Certificate, Identity, TlsConnector as NativeConnector};
use tokio_native_tls::{TlsConnector, TlsStream};
use tracing::debug;

use crate::{Result, ScannerError};

/// Client certificate and trust anchor loaded from one PEM file.
///
/// The file holds the certificate chain followed by the PKCS#8 private key.
/// Its first certificate is also trusted as the device's issuer.
#[derive(Clone)]
pub struct TlsIdentity {
    connector: Arc<TlsConnector>,
}

impl TlsIdentity {
    /// Loads the identity from a PEM file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|e| ScannerError::file_error(path.to_path_buf(), e))?;
        Self::from_pem(&pem)
    }

    /// Builds the identity from PEM bytes holding certificate and key.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let identity = Identity::from_pkcs8(pem, pem).map_err(|e| ScannerError::Config {
            reason: "invalid TLS certificate or key".to_string(),
            source: Some(Box::new(e)),
        })?;
        let anchor = Certificate::from_pem(pem).map_err(|e| ScannerError::Config {
            reason: "invalid TLS certificate".to_string(),
            source: Some(Box::new(e)),
        })?;

        let connector = NativeConnector::builder()
            .identity(identity)
            .add_root_certificate(anchor)
            .build()
            .map_err(|e| ScannerError::Config {
                reason: "failed to build TLS connector".to_string(),
                source: Some(Box::new(e)),
            })?;

        Ok(Self { connector: Arc::new(TlsConnector::from(connector)) })
    }

    pub(crate) async fn handshake(&self, host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        debug!("Starting TLS handshake with {}", host);
        self.connector.connect(host, tcp).await.map_err(|e| {
            ScannerError::connection_aborted_with_source(format!("TLS handshake with {} failed", host), e)
        })
    }
}
