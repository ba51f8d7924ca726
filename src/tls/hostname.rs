//! Hostname acceptance policy for TLS peers.
//!
//! # Design Decisions
//! - One policy for both backends, chosen from the trust configuration
//! - In custom mode the allow-list is authoritative: no fallback to
//!   certificate name matching
//! - In platform mode the certificate's own names decide

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;

use crate::config::TrustConfig;

/// What the verifier learned about the peer before the hostname decision.
#[derive(Debug, Clone, Copy)]
pub struct PeerSession<'a> {
    /// The server's end-entity certificate.
    pub end_entity: &'a CertificateDer<'a>,
    /// Whether the trusting delegate found `hostname` among the certificate's names.
    pub name_matches_certificate: bool,
}

/// Decides whether a TLS peer is acceptable for the hostname it was reached by.
pub trait HostnameVerifier: Send + Sync + fmt::Debug {
    fn verify(&self, hostname: &str, session: &PeerSession<'_>) -> bool;
}

/// Accepts exactly the configured hostnames (ASCII case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct AllowListHostnameVerifier {
    hostnames: Vec<String>,
}

impl AllowListHostnameVerifier {
    pub fn new<I, S>(hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hostnames: hostnames.into_iter().map(Into::into).collect(),
        }
    }
}

impl HostnameVerifier for AllowListHostnameVerifier {
    fn verify(&self, hostname: &str, _session: &PeerSession<'_>) -> bool {
        let accepted = self
            .hostnames
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(hostname));
        if !accepted {
            tracing::debug!(hostname, "Hostname not in allow-list");
        }
        accepted
    }
}

/// Standard certificate name matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHostnameVerifier;

impl HostnameVerifier for DefaultHostnameVerifier {
    fn verify(&self, _hostname: &str, session: &PeerSession<'_>) -> bool {
        session.name_matches_certificate
    }
}

/// Select the hostname policy for a trust configuration.
pub fn policy_for(config: &TrustConfig) -> Arc<dyn HostnameVerifier> {
    if config.is_custom() {
        Arc::new(AllowListHostnameVerifier::new(config.allowed_hostnames.iter().cloned()))
    } else {
        Arc::new(DefaultHostnameVerifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn session<'a>(cert: &'a CertificateDer<'static>, matches: bool) -> PeerSession<'a> {
        PeerSession {
            end_entity: cert,
            name_matches_certificate: matches,
        }
    }

    #[test]
    fn allow_list_is_case_insensitive_exact() {
        let cert = CertificateDer::from(vec![0x30]);
        let verifier = AllowListHostnameVerifier::new(["Api.Example.com"]);

        assert!(verifier.verify("api.example.com", &session(&cert, false)));
        assert!(!verifier.verify("www.api.example.com", &session(&cert, true)));
        assert!(!verifier.verify("example.com", &session(&cert, true)));
    }

    #[test]
    fn empty_allow_list_rejects_everything() {
        let cert = CertificateDer::from(vec![0x30]);
        let verifier = AllowListHostnameVerifier::default();
        assert!(!verifier.verify("localhost", &session(&cert, true)));
    }

    #[test]
    fn default_follows_certificate_match() {
        let cert = CertificateDer::from(vec![0x30]);
        assert!(DefaultHostnameVerifier.verify("a", &session(&cert, true)));
        assert!(!DefaultHostnameVerifier.verify("a", &session(&cert, false)));
    }

    #[test]
    fn custom_mode_does_not_fall_back_to_certificate_names() {
        let cert = CertificateDer::from(vec![0x30]);
        let config = TrustConfig {
            trust_store_path: Some(PathBuf::from("/etc/ca.pem")),
            ..TrustConfig::default()
        };

        let policy = policy_for(&config);
        assert!(!policy.verify("localhost", &session(&cert, true)));

        let policy = policy_for(&TrustConfig::default());
        assert!(policy.verify("localhost", &session(&cert, true)));
    }
}
