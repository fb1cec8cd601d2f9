use std::sync::Arc;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

use super::Connector;

/// Dials the relay over TCP and performs an implicit TLS (SMTPS) handshake.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpsConnector;

#[async_trait]
impl Connector for SmtpsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self, server: &ServerConfig) -> Result<Self::Stream> {
        let address = server.address();
        let tcp = TcpStream::connect(&address)
            .await
            .map_err(|e| Error::connection(format!("failed to connect to {}: {}", address, e)))?;

        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config(server)));
        let server_name = ServerName::try_from(server.host.clone())
            .map_err(|e| Error::connection(format!("invalid server name {}: {}", server.host, e)))?;

        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::connection(format!("TLS handshake with {} failed: {}", address, e)))?;

        tracing::debug!("TLS established with {}", address);
        Ok(stream)
    }
}

fn client_config(server: &ServerConfig) -> ClientConfig {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    if server.allow_insecure_tls {
        tracing::warn!(
            "Certificate verification disabled for {}, connection is not authenticated",
            server.host
        );
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoCertVerifier));
    }
    config
}

/// Accepts any certificate. Only installed with `allow_insecure_tls`.
#[derive(Debug)]
struct NoCertVerifier;

impl ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
