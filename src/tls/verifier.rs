//! Composite server certificate verification.
//!
//! The platform delegate is consulted first; a chain it rejects gets a second
//! chance against the locally configured anchors. Chain trust and name
//! matching are separated so the hostname policy gets the final word.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, Error, SignatureScheme};

use crate::tls::hostname::{HostnameVerifier, PeerSession};

enum ChainVerdict {
    Trusted { name_matches: bool },
    Rejected(Error),
}

impl ChainVerdict {
    fn from_result(result: Result<ServerCertVerified, Error>) -> Self {
        match result {
            Ok(_) => ChainVerdict::Trusted { name_matches: true },
            // the name check only runs once the chain has been accepted
            Err(Error::InvalidCertificate(CertificateError::NotValidForName))
            | Err(Error::InvalidCertificate(CertificateError::NotValidForNameContext { .. })) => {
                ChainVerdict::Trusted { name_matches: false }
            }
            Err(e) => ChainVerdict::Rejected(e),
        }
    }
}

/// Trust decision over the platform store with a local fallback.
#[derive(Debug)]
pub struct CompositeTrustDecision {
    platform: Arc<dyn ServerCertVerifier>,
    local: Option<Arc<dyn ServerCertVerifier>>,
    hostname: Arc<dyn HostnameVerifier>,
}

impl CompositeTrustDecision {
    pub fn new(
        platform: Arc<dyn ServerCertVerifier>,
        local: Option<Arc<dyn ServerCertVerifier>>,
        hostname: Arc<dyn HostnameVerifier>,
    ) -> Self {
        Self {
            platform,
            local,
            hostname,
        }
    }
}

impl ServerCertVerifier for CompositeTrustDecision {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        let platform = ChainVerdict::from_result(self.platform.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ));

        let name_matches = match platform {
            ChainVerdict::Trusted { name_matches } => name_matches,
            ChainVerdict::Rejected(platform_err) => {
                let local = self.local.as_ref().map(|local| {
                    ChainVerdict::from_result(local.verify_server_cert(
                        end_entity,
                        intermediates,
                        server_name,
                        ocsp_response,
                        now,
                    ))
                });
                match local {
                    Some(ChainVerdict::Trusted { name_matches }) => {
                        tracing::trace!(server = %server_name.to_str(), "Chain trusted by local anchors");
                        name_matches
                    }
                    Some(ChainVerdict::Rejected(local_err)) => {
                        tracing::debug!(
                            server = %server_name.to_str(),
                            platform = %platform_err,
                            local = %local_err,
                            "Certificate chain rejected"
                        );
                        return Err(platform_err);
                    }
                    None => return Err(platform_err),
                }
            }
        };

        let hostname = server_name.to_str();
        let session = PeerSession {
            end_entity,
            name_matches_certificate: name_matches,
        };
        if self.hostname.verify(&hostname, &session) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(Error::InvalidCertificate(CertificateError::NotValidForName))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.platform.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.platform.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.platform.supported_verify_schemes()
    }
}
