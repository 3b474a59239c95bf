//! rustls client configuration from context TLS material

use crate::context::{TlsMaterial, TlsPolicy};
use crate::{CliError, Result};
use pkcs8::der::Decode;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::io::BufReader;
use std::sync::Arc;

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Whether the key needs a passphrase before a config can be built
pub fn key_is_encrypted(material: &TlsMaterial) -> bool {
    material.key.as_deref().is_some_and(|key| {
        let text = String::from_utf8_lossy(key);
        text.contains(ENCRYPTED_KEY_LABEL) || text.contains("Proc-Type: 4,ENCRYPTED")
    })
}

/// Build the TLS client configuration for `policy`; `None` when TLS is off.
pub fn client_config(
    policy: TlsPolicy,
    material: &TlsMaterial,
    passphrase: Option<&str>,
) -> Result<Option<Arc<ClientConfig>>> {
    if policy == TlsPolicy::Off {
        return Ok(None);
    }

    let builder = ClientConfig::builder();
    let builder = if policy == TlsPolicy::On {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new()))
    } else {
        builder.with_root_certificates(root_store(material.ca.as_deref())?)
    };

    let config = match (&material.cert, &material.key) {
        (Some(cert), Some(key)) => {
            let certs = parse_certs(cert)?;
            let key = parse_key(key, passphrase)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| CliError::invalid_argument(format!("invalid client certificate: {}", e)))?
        }
        _ => builder.with_no_client_auth(),
    };
    Ok(Some(Arc::new(config)))
}

fn root_store(ca: Option<&[u8]>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match ca {
        Some(ca) => {
            for cert in parse_certs(ca)? {
                roots
                    .add(cert)
                    .map_err(|e| CliError::invalid_argument(format!("invalid CA certificate: {}", e)))?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| CliError::invalid_argument(format!("failed to parse certificate: {}", e)))?;
    if certs.is_empty() {
        return Err(CliError::invalid_argument("no certificates found in PEM data"));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8], passphrase: Option<&str>) -> Result<PrivateKeyDer<'static>> {
    let text = String::from_utf8_lossy(pem);
    if text.contains(ENCRYPTED_KEY_LABEL) {
        let passphrase = passphrase
            .ok_or_else(|| CliError::invalid_argument("private key is encrypted, passphrase required"))?;
        return decrypt_pkcs8(&text, passphrase);
    }
    if text.contains("Proc-Type: 4,ENCRYPTED") {
        return Err(CliError::invalid_argument(
            "legacy PEM encryption is not supported, convert the key to PKCS#8",
        ));
    }
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| CliError::invalid_argument(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| CliError::invalid_argument("no private key found in PEM data"))
}

fn decrypt_pkcs8(pem: &str, passphrase: &str) -> Result<PrivateKeyDer<'static>> {
    let (label, doc) = pkcs8::Document::from_pem(pem)
        .map_err(|e| CliError::invalid_argument(format!("failed to parse private key: {}", e)))?;
    if label != ENCRYPTED_KEY_LABEL {
        return Err(CliError::invalid_argument(format!(
            "unexpected PEM block {:?}",
            label
        )));
    }
    let info = pkcs8::EncryptedPrivateKeyInfo::from_der(doc.as_bytes())
        .map_err(|e| CliError::invalid_argument(format!("failed to parse private key: {}", e)))?;
    let secret = info
        .decrypt(passphrase)
        .map_err(|e| CliError::invalid_argument(format!("failed to decrypt private key: {}", e)))?;
    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        secret.as_bytes().to_vec(),
    )))
}

/// Accepts any server certificate; used for `--tls` without `--tlsverify`.
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl NoVerifier {
    fn new() -> Self {
        Self(Arc::new(rustls::crypto::ring::default_provider()))
    }
}

impl ServerCertVerifier for NoVerifier {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
