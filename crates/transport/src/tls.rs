//! TLS wrapping with optional certificate fingerprint pinning.
//!
//! LAN chess servers present self-signed certificates, so WebPKI chain
//! validation is useless here. Trust comes from pinning instead: when the
//! endpoint carries a fingerprint, the SHA-256 of the server's leaf
//! certificate (DER encoding) must match it. Without a pinned fingerprint
//! any certificate is accepted (trust-on-first-use).

use crate::error::{Result, TransportError};
use crate::stream::NetStream;
use ring::digest;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConnection, StreamOwned};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Marker used to recognize a pinning failure in the error text surfaced
/// through rustls' generic error type.
const MISMATCH_MARKER: &str = "certificate fingerprint mismatch";

/// SHA-256 of a DER-encoded certificate as lowercase colon-separated hex.
pub fn fingerprint(der: &[u8]) -> String {
    let digest = digest::digest(&digest::SHA256, der);
    digest
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Certificate verifier that checks the leaf's SHA-256 fingerprint when one
/// is pinned and accepts anything otherwise.
#[derive(Debug)]
struct FingerprintVerifier {
    expected: Option<String>,
}

impl ServerCertVerifier for FingerprintVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if let Some(expected) = &self.expected {
            let actual = fingerprint(end_entity.as_ref());
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(rustls::Error::General(format!(
                    "{MISMATCH_MARKER}: expected {expected}, got {actual}"
                )));
            }
            info!("certificate fingerprint verified");
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}

/// Run the TLS handshake over a connected socket.
///
/// `pinned` is the expected leaf fingerprint, or empty for unpinned.
/// `timeout` bounds the handshake I/O so a stalled server cannot hang the
/// connect phase.
pub fn wrap(
    mut tcp: TcpStream,
    host: &str,
    pinned: &str,
    timeout: Duration,
) -> Result<NetStream> {
    let expected = (!pinned.is_empty()).then(|| pinned.to_string());
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(FingerprintVerifier { expected }))
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
        TransportError::TlsHandshake {
            message: format!("invalid server name {host}: {e}"),
            fingerprint_mismatch: false,
        }
    })?;
    let mut conn =
        ClientConnection::new(Arc::new(config), server_name).map_err(|e| {
            TransportError::TlsHandshake {
                message: e.to_string(),
                fingerprint_mismatch: false,
            }
        })?;

    tcp.set_read_timeout(Some(timeout))?;
    while conn.is_handshaking() {
        conn.complete_io(&mut tcp).map_err(classify_handshake_error)?;
    }
    debug!("TLS handshake completed with {host}");

    Ok(NetStream::Tls(Box::new(StreamOwned::new(conn, tcp))))
}

fn classify_handshake_error(e: std::io::Error) -> TransportError {
    if matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    ) {
        return TransportError::Timeout("TLS handshake".into());
    }
    let message = e.to_string();
    TransportError::TlsHandshake {
        fingerprint_mismatch: message.contains(MISMATCH_MARKER),
        message,
    }
}
