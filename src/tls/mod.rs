//! TLS trust subsystem.
//!
//! # Data Flow
//! ```text
//! TrustConfig
//!     → material.rs (load stores, derive anchors + client identity)
//!     → verifier.rs (platform delegate, then local delegate)
//!     → hostname.rs (allow-list or certificate name matching)
//!     → rustls::ClientConfig (protocol pinned, ALPN http/1.1)
//!     → net::socket (TLS socket factory)
//! ```
//!
//! # Design Decisions
//! - Trust material is rebuilt from disk for every secure client, never cached
//! - The plain client trusts the platform store only and negotiates versions
//! - The ring provider is used explicitly, no process-wide default provider

pub mod hostname;
pub mod material;
pub mod verifier;

use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;

use crate::config::TrustConfig;
use crate::error::InitError;
use crate::tls::hostname::HostnameVerifier;
use crate::tls::material::TrustMaterial;
use crate::tls::verifier::CompositeTrustDecision;

pub use hostname::{AllowListHostnameVerifier, DefaultHostnameVerifier, PeerSession};
pub use material::{ClientIdentity, TrustMaterialError};

const ALPN_HTTP1: &[u8] = b"http/1.1";

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// TLS context for the plain client: platform trust, default versions.
pub fn platform_client_config() -> Result<rustls::ClientConfig, InitError> {
    let mut config = rustls::ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(material::platform_roots())
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

    Ok(config)
}

/// TLS context for the secure client.
///
/// Pins `trust.protocol`, verifies servers through [`CompositeTrustDecision`]
/// and presents the client identity when one was loaded.
pub fn secure_client_config(
    trust: &TrustConfig,
    material: TrustMaterial,
    hostname: Arc<dyn HostnameVerifier>,
) -> Result<rustls::ClientConfig, InitError> {
    let provider = provider();

    let platform: Arc<dyn ServerCertVerifier> =
        WebPkiServerVerifier::builder_with_provider(Arc::new(material::platform_roots()), provider.clone())
            .build()?;
    let local: Option<Arc<dyn ServerCertVerifier>> = match material.trust_anchors {
        Some(anchors) => Some(
            WebPkiServerVerifier::builder_with_provider(Arc::new(anchors), provider.clone()).build()?,
        ),
        None => None,
    };

    let verifier = CompositeTrustDecision::new(platform, local, hostname);
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[trust.protocol.protocol()])?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier));

    let mut config = match material.identity {
        Some(identity) => builder.with_client_auth_cert(identity.chain, identity.key)?,
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

    tracing::debug!(
        protocol = ?trust.protocol,
        custom_mode = trust.is_custom(),
        "Built secure TLS context"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsVersion;

    #[test]
    fn platform_config_speaks_http1() {
        let config = platform_client_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn secure_config_without_material() {
        let trust = TrustConfig {
            protocol: TlsVersion::Tls13,
            ..TrustConfig::default()
        };
        let config = secure_client_config(
            &trust,
            TrustMaterial::default(),
            hostname::policy_for(&trust),
        )
        .unwrap();
        assert!(!config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn secure_config_with_identity() {
        let client = rcgen::generate_simple_self_signed(vec!["client".to_string()]).unwrap();
        let identity = ClientIdentity {
            chain: vec![client.cert.der().clone()],
            key: rustls::pki_types::PrivateKeyDer::Pkcs8(client.key_pair.serialize_der().into()),
        };
        let material = TrustMaterial {
            trust_anchors: None,
            identity: Some(identity),
        };
        let trust = TrustConfig::default();

        let config = secure_client_config(&trust, material, hostname::policy_for(&trust)).unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());
    }
}
