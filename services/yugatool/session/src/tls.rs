//! TLS trust configuration for outbound connections.
//!
//! This module turns a [`TrustConfig`] (CA bundle, optional client identity,
//! optional host-verification bypass) into a rustls [`ClientConfig`]. All
//! certificate material is read through a [`Filesystem`] so tests can run
//! without touching disk.

use crate::fs::Filesystem;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Trust and identity settings for TLS connections.
///
/// Empty paths mean "not configured". A config equal to
/// `TrustConfig::default()` selects plaintext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustConfig {
    /// Accept any server certificate
    pub skip_host_verification: bool,
    /// PEM bundle of trusted CAs; system roots when empty
    pub ca_cert_path: String,
    /// PEM client certificate chain
    pub cert_path: String,
    /// PEM client private key
    pub key_path: String,
}

impl TrustConfig {
    /// Whether connections should use TLS
    pub fn has_tls(&self) -> bool {
        *self != TrustConfig::default()
    }

    fn has_client_identity(&self) -> bool {
        !self.cert_path.is_empty() || !self.key_path.is_empty()
    }
}

/// Whether an optional trust configuration asks for TLS
pub fn has_tls(trust: Option<&TrustConfig>) -> bool {
    trust.map(TrustConfig::has_tls).unwrap_or(false)
}

/// Errors building a TLS client configuration
#[derive(Error, Debug)]
pub enum TlsConfigError {
    /// Only one of certificate and key was given
    #[error("client certificate and key must both be set")]
    IncompleteClientIdentity,

    /// The CA bundle could not be read
    #[error("unable to read {path}: {source}")]
    Read {
        /// Path that failed
        path: String,
        /// Read failure
        #[source]
        source: std::io::Error,
    },

    /// The CA bundle held no usable certificate
    #[error("unable to add {0} to the CA list")]
    InvalidCa(String),

    /// The client certificate could not be read
    #[error("unable to read x509 certificate: {0}")]
    ReadCertificate(#[source] std::io::Error),

    /// The client key could not be read
    #[error("unable to read client key: {0}")]
    ReadKey(#[source] std::io::Error),

    /// The client certificate and key do not form a usable identity
    #[error("unable to read x509 key pair: {0}")]
    KeyPair(String),
}

/// Build a rustls client configuration from `trust`
pub fn build_client_config(
    trust: &TrustConfig,
    fs: &dyn Filesystem,
) -> Result<ClientConfig, TlsConfigError> {
    if trust.cert_path.is_empty() != trust.key_path.is_empty() {
        return Err(TlsConfigError::IncompleteClientIdentity);
    }

    // Install default crypto provider if not already set
    let _ = rustls::crypto::ring::default_provider().install_default();

    let ca_roots = if trust.ca_cert_path.is_empty() {
        None
    } else {
        Some(load_ca_bundle(&trust.ca_cert_path, fs)?)
    };

    let builder = ClientConfig::builder();
    let builder = if trust.skip_host_verification {
        warn!("server certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new()))
    } else {
        builder.with_root_certificates(ca_roots.unwrap_or_else(native_roots))
    };

    if !trust.has_client_identity() {
        return Ok(builder.with_no_client_auth());
    }

    let (certs, key) = load_client_identity(trust, fs)?;
    builder
        .with_client_auth_cert(certs, key)
        .map_err(|e| TlsConfigError::KeyPair(e.to_string()))
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        debug!("skipping system root certificate: {}", err);
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "loaded system root certificates");
    roots
}

fn load_ca_bundle(path: &str, fs: &dyn Filesystem) -> Result<RootCertStore, TlsConfigError> {
    let pem = fs.read_file(path).map_err(|source| TlsConfigError::Read {
        path: path.to_string(),
        source,
    })?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|_| TlsConfigError::InvalidCa(path.to_string()))?;

    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TlsConfigError::InvalidCa(path.to_string()));
    }
    debug!(path, added, "loaded CA bundle");
    Ok(roots)
}

fn load_client_identity(
    trust: &TrustConfig,
    fs: &dyn Filesystem,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsConfigError> {
    let cert_pem = fs
        .read_file(&trust.cert_path)
        .map_err(TlsConfigError::ReadCertificate)?;
    let key_pem = fs.read_file(&trust.key_path).map_err(TlsConfigError::ReadKey)?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| TlsConfigError::KeyPair(e.to_string()))?;
    if certs.is_empty() {
        return Err(TlsConfigError::KeyPair(
            "failed to find any PEM data in certificate input".to_string(),
        ));
    }
    for cert in &certs {
        x509_parser::parse_x509_certificate(cert.as_ref())
            .map_err(|e| TlsConfigError::KeyPair(e.to_string()))?;
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| TlsConfigError::KeyPair(e.to_string()))?
        .ok_or_else(|| {
            TlsConfigError::KeyPair("failed to find any PEM data in key input".to_string())
        })?;

    Ok((certs, key))
}

/// Certificate verifier that accepts any server certificate (INSECURE)
#[derive(Debug)]
struct SkipServerVerification {
    schemes: Vec<SignatureScheme>,
}

impl SkipServerVerification {
    fn new() -> Self {
        Self {
            schemes: rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for SkipServerVerification {
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
