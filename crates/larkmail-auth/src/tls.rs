//! Self-signed certificate for the loopback callback listener
//!
//! The provider insists on an `https://` redirect URI, so the listener needs
//! some certificate. It only has to exist for the length of one login and is
//! never meant to be trusted by anything.

use crate::{AuthError, AuthResult};
use axum_server::tls_rustls::RustlsConfig;
use rcgen::{CertificateParams, DnType, KeyPair};
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Names the certificate is issued for
pub const LOOPBACK_NAMES: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// How long the certificate stays valid
pub const CERT_LIFETIME: Duration = Duration::hours(1);

/// PEM-encoded certificate and private key
pub struct SelfSignedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for SelfSignedCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfSignedCert").finish_non_exhaustive()
    }
}

/// Generate an ECDSA P-256 certificate for the loopback names
pub fn generate_self_signed() -> AuthResult<SelfSignedCert> {
    let names: Vec<String> = LOOPBACK_NAMES.iter().map(|n| n.to_string()).collect();
    let mut params =
        CertificateParams::new(names).map_err(|e| AuthError::Tls(e.to_string()))?;
    params
        .distinguished_name
        .push(DnType::OrganizationName, "larkmail");
    params.distinguished_name.push(DnType::CommonName, "localhost");

    let now = OffsetDateTime::now_utc();
    // small backdate for clock skew between us and the browser
    params.not_before = now - Duration::minutes(5);
    params.not_after = now + CERT_LIFETIME;

    let key_pair = KeyPair::generate().map_err(|e| AuthError::Tls(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| AuthError::Tls(e.to_string()))?;

    debug!("Generated self-signed certificate for the callback listener");
    Ok(SelfSignedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

/// Build the rustls server configuration for the callback listener
pub async fn rustls_config() -> AuthResult<RustlsConfig> {
    // Idempotent; fails only if another provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert = generate_self_signed()?;
    RustlsConfig::from_pem(cert.cert_pem.into_bytes(), cert.key_pem.into_bytes())
        .await
        .map_err(|e| AuthError::Tls(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_pem_pair() {
        let cert = generate_self_signed().unwrap();
        assert!(cert.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(cert.key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_each_call_uses_a_fresh_key() {
        let a = generate_self_signed().unwrap();
        let b = generate_self_signed().unwrap();
        assert_ne!(a.key_pem, b.key_pem);
    }

    #[tokio::test]
    async fn test_builds_rustls_config() {
        assert!(rustls_config().await.is_ok());
    }
}
