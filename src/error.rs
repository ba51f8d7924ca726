//! Error taxonomy shared by the factory, the pool and the transports.

use std::time::Duration;
use thiserror::Error;

use crate::config::ValidationError;
use crate::net::route::Route;
use crate::tls::material::TrustMaterialError;

/// Client construction failed. Fatal, never retried; no handle is returned.
#[derive(Debug, Error)]
pub enum InitError {
    /// The configuration has fatal validation issues.
    #[error("invalid configuration: {}", render_issues(.0))]
    Validation(Vec<ValidationError>),

    /// Key or trust store could not be loaded.
    #[error(transparent)]
    TrustMaterial(#[from] TrustMaterialError),

    /// rustls refused the TLS setup (protocol pinning, client identity).
    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    /// A certificate verifier could not be built from the trust anchors.
    #[error("certificate verifier setup failed: {0}")]
    Verifier(#[from] rustls::client::VerifierBuilderError),
}

fn render_issues(issues: &[ValidationError]) -> String {
    issues
        .iter()
        .filter(|i| i.is_fatal())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A request failed. None of these tear down the pool.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server certificate rejected by every trust evaluator, or hostname not accepted.
    #[error("server certificate for {route} not trusted: {source}")]
    Trust {
        route: Route,
        #[source]
        source: rustls::Error,
    },

    /// TLS failure unrelated to certificate trust.
    #[error("TLS handshake with {route} failed: {source}")]
    Tls {
        route: Route,
        #[source]
        source: rustls::Error,
    },

    /// No pooled connection became available within the request timeout.
    #[error("connection pool exhausted for {route} after waiting {waited:?}")]
    PoolExhausted { route: Route, waited: Duration },

    #[error("failed to connect to {route}: {source}")]
    Connect {
        route: Route,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {route} timed out after {timeout:?}")]
    ConnectTimeout { route: Route, timeout: Duration },

    #[error("no response from {route} within {timeout:?}")]
    ReadTimeout { route: Route, timeout: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client handle (or its pool) has been closed.
    #[error("client is closed")]
    Closed,
}

impl ClientError {
    /// Transient failures the caller may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::PoolExhausted { .. }
                | ClientError::ConnectTimeout { .. }
                | ClientError::ReadTimeout { .. }
        )
    }

    pub fn is_trust(&self) -> bool {
        matches!(self, ClientError::Trust { .. })
    }

    /// Rebuild a connector failure from a source chain (the hyper-util client
    /// boxes connector errors).
    pub(crate) fn find_in_chain(err: &(dyn std::error::Error + 'static)) -> Option<ClientError> {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(found) = e.downcast_ref::<ClientError>() {
                return found.duplicate();
            }
            current = e.source();
        }
        None
    }

    fn duplicate(&self) -> Option<ClientError> {
        match self {
            ClientError::Trust { route, source } => Some(ClientError::Trust {
                route: route.clone(),
                source: source.clone(),
            }),
            ClientError::Tls { route, source } => Some(ClientError::Tls {
                route: route.clone(),
                source: source.clone(),
            }),
            ClientError::ConnectTimeout { route, timeout } => Some(ClientError::ConnectTimeout {
                route: route.clone(),
                timeout: *timeout,
            }),
            ClientError::UnsupportedScheme(scheme) => Some(ClientError::UnsupportedScheme(scheme.clone())),
            _ => None,
        }
    }
}

/// A resource could not be released cleanly during `close()`.
///
/// Release of the remaining resources continues regardless.
#[derive(Debug, Error)]
#[error("failed to release resources of pool '{pool}': {reason}")]
pub struct ReleaseError {
    pub pool: String,
    pub reason: String,
}
