//! Socket factories, keyed by URI scheme.
//!
//! # Responsibilities
//! - TCP connect under the connect timeout, `TCP_NODELAY` on
//! - TLS handshake for `https` routes
//! - Classify handshake failures (trust vs. other TLS errors)
//! - Serve as the `hyper_util` connector (`tower::Service<Uri>`)

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::Uri;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::ClientError;
use crate::net::route::{Route, Scheme};
use crate::net::stream::{MaybeTlsStream, PooledIo};

/// TLS client side of a socket factory.
#[derive(Clone)]
pub struct TlsSocketFactory {
    connector: TlsConnector,
}

impl TlsSocketFactory {
    pub fn new(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            connector: TlsConnector::from(config),
        }
    }

    async fn handshake(&self, route: &Route, tcp: TcpStream) -> Result<MaybeTlsStream, ClientError> {
        let server_name = ServerName::try_from(route.host().to_string()).map_err(|e| {
            ClientError::InvalidRequest(format!("'{}' is not a valid TLS server name: {}", route.host(), e))
        })?;

        let stream = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| classify_handshake_error(route, e))?;

        Ok(MaybeTlsStream::Tls(Box::new(stream)))
    }
}

impl fmt::Debug for TlsSocketFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSocketFactory").finish_non_exhaustive()
    }
}

/// Map a tokio-rustls handshake error onto the client error taxonomy.
fn classify_handshake_error(route: &Route, err: std::io::Error) -> ClientError {
    let tls_error = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .cloned();

    match tls_error {
        Some(source @ rustls::Error::InvalidCertificate(_)) => {
            tracing::warn!(route = %route, error = %source, "Server certificate rejected");
            ClientError::Trust {
                route: route.clone(),
                source,
            }
        }
        Some(source) => ClientError::Tls {
            route: route.clone(),
            source,
        },
        None => ClientError::Connect {
            route: route.clone(),
            source: err,
        },
    }
}

/// How sockets for one scheme are created.
#[derive(Debug, Clone)]
pub enum SocketFactory {
    Plain,
    Tls(TlsSocketFactory),
}

impl SocketFactory {
    /// Open a socket to `route`. TCP connect and TLS handshake share the timeout.
    pub async fn connect(&self, route: &Route, connect_timeout: Duration) -> Result<MaybeTlsStream, ClientError> {
        let attempt = async {
            let tcp = TcpStream::connect((route.host(), route.port()))
                .await
                .map_err(|source| ClientError::Connect {
                    route: route.clone(),
                    source,
                })?;
            if let Err(e) = tcp.set_nodelay(true) {
                tracing::debug!(route = %route, error = %e, "Failed to set TCP_NODELAY");
            }

            match self {
                SocketFactory::Plain => Ok(MaybeTlsStream::Plain(tcp)),
                SocketFactory::Tls(tls) => tls.handshake(route, tcp).await,
            }
        };

        tokio::time::timeout(connect_timeout, attempt)
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                route: route.clone(),
                timeout: connect_timeout,
            })?
    }
}

/// Scheme → socket factory mapping used by a client's pool.
#[derive(Debug, Clone)]
pub struct SocketFactoryRegistry {
    factories: HashMap<Scheme, SocketFactory>,
    connect_timeout: Duration,
}

impl SocketFactoryRegistry {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            factories: HashMap::new(),
            connect_timeout,
        }
    }

    /// Register the factory for a scheme, replacing any earlier one.
    pub fn register(mut self, scheme: Scheme, factory: SocketFactory) -> Self {
        self.factories.insert(scheme, factory);
        self
    }

    pub fn lookup(&self, scheme: Scheme) -> Result<&SocketFactory, ClientError> {
        self.factories
            .get(&scheme)
            .ok_or_else(|| ClientError::UnsupportedScheme(scheme.as_str().to_string()))
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Open a socket for `route` with the factory registered for its scheme.
    pub async fn connect(&self, route: &Route) -> Result<MaybeTlsStream, ClientError> {
        let factory = self.lookup(route.scheme())?;
        let stream = factory.connect(route, self.connect_timeout).await?;

        tracing::debug!(
            route = %route,
            tls = stream.is_tls(),
            peer = ?stream.peer_addr().ok(),
            "Opened connection"
        );
        Ok(stream)
    }
}

impl tower::Service<Uri> for SocketFactoryRegistry {
    type Response = PooledIo;
    type Error = ClientError;
    type Future = Pin<Box<dyn Future<Output = Result<PooledIo, ClientError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let registry = self.clone();
        Box::pin(async move {
            let route = Route::from_uri(&uri)?;
            let stream = registry.connect(&route).await?;
            Ok(PooledIo::new(stream))
        })
    }
}
