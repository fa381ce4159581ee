//! Implicit-TLS transport for NNTPS (port 563).
//!
//! The session layer never looks at TLS; this module performs the handshake
//! and hands the encrypted stream to [`Session::from_stream`].

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error::NntpError;
use crate::session::Session;

/// Build a TLS client configuration trusting the webpki roots.
///
/// With `cert_verification` off any server certificate is accepted, which
/// is what self-signed news servers need.
pub fn build_tls_config(cert_verification: bool) -> Arc<ClientConfig> {
    let provider = rustls::crypto::ring::default_provider();
    let _ = provider.install_default();

    let config = if cert_verification {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new()))
            .with_no_client_auth()
    };
    Arc::new(config)
}

/// Connect, complete the TLS handshake and read the NNTP greeting.
pub async fn connect_tls(
    host: &str,
    port: u16,
    config: Arc<ClientConfig>,
) -> Result<Session, NntpError> {
    let attempt = async {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| NntpError::Tls(format!("invalid hostname: {host}")))?;
        let tcp = TcpStream::connect((host, port)).await?;
        let stream = TlsConnector::from(config)
            .connect(server_name, tcp)
            .await
            .map_err(|e| NntpError::Tls(e.to_string()))?;
        Session::from_stream(stream).await
    };
    attempt.await.map_err(|source| NntpError::Connect {
        addr: format!("{host}:{port}"),
        source: Box::new(source),
    })
}

#[derive(Debug)]
struct AcceptAnyCert {
    schemes: Vec<SignatureScheme>,
}

impl AcceptAnyCert {
    fn new() -> Self {
        Self {
            schemes: rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}
