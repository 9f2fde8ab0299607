use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rustls::{
    ClientConfig, DigitallySignedStruct, ProtocolVersion, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::{
    net::IpAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::{net::TcpStream, time};
use tokio_rustls::TlsConnector;
use x509_parser::{
    der_parser::oid::Oid,
    objects::{oid2sn, oid_registry},
    prelude::{FromDer, X509Certificate},
    time::ASN1Time,
    x509::X509Name,
};

pub const HTTPS_PORT: u16 = 443;

const SECONDS_PER_DAY: f64 = 86_400.0;

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// Safe to call multiple times; initialization only happens once.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        if let Err(err) = rustls::crypto::ring::default_provider().install_default() {
            eprintln!("failed to install ring crypto provider: {err:?}");
            std::process::exit(1);
        }
    });
}

/// Peer certificate details extracted after a successful handshake
#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Issuer common name, or the serialized DN when no CN is present
    pub issuer: String,
    /// Subject common name, same fallback as the issuer
    pub subject: String,
    /// Signature algorithm short name (dotted OID when unregistered)
    pub signature_algorithm: String,
    /// Negotiated protocol version (e.g. `TLSv1.3`)
    pub protocol: Option<String>,
}

/// Handshake against `domain:port` with SNI set and certificate
/// verification disabled, and extract the peer certificate.
///
/// Verification stays disabled on purpose: the probe reports on
/// certificates, including self-signed or mismatched ones, and must not
/// make a trust decision. Returns `Ok(None)` when the handshake succeeds
/// but the server presents no certificate. The TLS stream is dropped as
/// soon as extraction finishes, on every path.
///
/// # Errors
///
/// Returns an error if the TCP connection, the TLS handshake, or
/// certificate parsing fails, or when the connect timeout elapses.
pub async fn inspect(
    domain: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<Option<CertInfo>> {
    let stream = time::timeout(connect_timeout, TcpStream::connect((domain, port)))
        .await
        .map_err(|_| {
            anyhow!(
                "connection to {domain}:{port} timed out after {}s",
                connect_timeout.as_secs()
            )
        })?
        .with_context(|| format!("failed to connect to {domain}:{port}"))?;

    let connector = build_tls_connector();
    let server_name = server_name_from_host(domain)
        .with_context(|| format!("invalid server name: {domain}"))?;

    let tls_stream = time::timeout(connect_timeout, connector.connect(server_name, stream))
        .await
        .map_err(|_| {
            anyhow!(
                "TLS handshake with {domain} timed out after {}s",
                connect_timeout.as_secs()
            )
        })?
        .with_context(|| format!("TLS handshake with {domain} failed"))?;

    let (_, connection) = tls_stream.get_ref();
    let protocol = connection.protocol_version().map(protocol_name);

    let Some(cert_der) = connection.peer_certificates().and_then(<[_]>::first) else {
        return Ok(None);
    };

    extract_cert_info(cert_der.as_ref(), protocol).map(Some)
}

/// Days until expiry, rounded to the nearest day; negative once expired
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn days_remaining(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (not_after - now).num_seconds();
    (seconds as f64 / SECONDS_PER_DAY).round() as i64
}

/// Heuristic 0-100 freshness/strength score; not a security audit
///
/// Starts at 100: minus 30 under 30 days remaining (minus 10 under 90),
/// minus 20 when the signature algorithm name contains `sha1`. The two
/// deductions leave a floor of 50.
#[must_use]
pub fn score(days_remaining: i64, signature_algorithm: Option<&str>) -> u8 {
    let mut value: i64 = 100;

    if days_remaining < 30 {
        value -= 30;
    } else if days_remaining < 90 {
        value -= 10;
    }

    if signature_algorithm.is_some_and(|alg| alg.to_lowercase().contains("sha1")) {
        value -= 20;
    }

    u8::try_from(value.max(0)).unwrap_or(0)
}

fn build_tls_connector() -> TlsConnector {
    ensure_crypto_provider();

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

fn server_name_from_host(host: &str) -> Result<ServerName<'static>> {
    host.parse::<IpAddr>().map_or_else(
        |_| {
            ServerName::try_from(host.to_string())
                .map_err(|_| anyhow!("invalid server name: {host}"))
        },
        |ip| Ok(ServerName::from(ip).to_owned()),
    )
}

fn extract_cert_info(cert_der: &[u8], protocol: Option<String>) -> Result<CertInfo> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| anyhow!("failed to parse peer certificate: {e}"))?;

    let validity = cert.validity();

    Ok(CertInfo {
        not_before: asn1_to_utc(&validity.not_before)?,
        not_after: asn1_to_utc(&validity.not_after)?,
        issuer: common_name(cert.issuer()),
        subject: common_name(cert.subject()),
        signature_algorithm: signature_algorithm_name(&cert.signature_algorithm.algorithm),
        protocol,
    })
}

fn asn1_to_utc(timestamp: &ASN1Time) -> Result<DateTime<Utc>> {
    let raw = timestamp.to_datetime();
    DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())
        .ok_or_else(|| anyhow!("certificate timestamp out of range"))
}

fn common_name(name: &X509Name) -> String {
    name.iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map_or_else(|| name.to_string(), ToString::to_string)
}

fn signature_algorithm_name(oid: &Oid) -> String {
    oid2sn(oid, oid_registry()).map_or_else(|_| oid.to_id_string(), ToString::to_string)
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        other => format!("{other:?}"),
    }
}

/// Certificate verifier that accepts any certificate without validation.
///
/// Only used by the inspection handshake: the probe must succeed against
/// expired, self-signed, or mismatched certificates so it can report on
/// them. Nothing else in the process uses this verifier.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
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
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
