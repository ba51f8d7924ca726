//! Client factory: builds configured client handles.
//!
//! # Responsibilities
//! - Validate the configuration once, at build time
//! - Assemble socket factories and TLS contexts per client
//! - Track issued handles so they can be closed together

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::handle::HttpClient;
use crate::client::transport::{HyperTransport, PooledTransport, Transport};
use crate::config::{validate_config, BackendKind, ClientConfig};
use crate::error::{InitError, ReleaseError};
use crate::lifecycle::ClientState;
use crate::net::route::Scheme;
use crate::net::socket::{SocketFactory, SocketFactoryRegistry, TlsSocketFactory};
use crate::pool::{DefaultKeepAliveStrategy, KeepAliveStrategy};
use crate::tls::hostname::{self, HostnameVerifier};
use crate::tls::material::TrustMaterial;

/// Builder for [`ClientFactory`] with its extension points.
pub struct ClientFactoryBuilder {
    config: ClientConfig,
    keep_alive: Option<Arc<dyn KeepAliveStrategy>>,
    hostname_verifier: Option<Arc<dyn HostnameVerifier>>,
    backend: Option<BackendKind>,
}

impl ClientFactoryBuilder {
    /// Replace the keep-alive strategy of the pooled backend.
    pub fn keep_alive_strategy(mut self, strategy: Arc<dyn KeepAliveStrategy>) -> Self {
        self.keep_alive = Some(strategy);
        self
    }

    /// Replace the hostname policy of secure clients.
    pub fn hostname_verifier(mut self, verifier: Arc<dyn HostnameVerifier>) -> Self {
        self.hostname_verifier = Some(verifier);
        self
    }

    /// Override the backend named in the configuration.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<ClientFactory, InitError> {
        let warnings = validate_config(&self.config).map_err(InitError::Validation)?;
        for warning in &warnings {
            tracing::warn!(field = warning.field, "Configuration warning: {}", warning.message);
        }

        let backend = self.backend.unwrap_or(self.config.backend);
        let keep_alive = self
            .keep_alive
            .unwrap_or_else(|| Arc::new(DefaultKeepAliveStrategy::new(self.config.pool.keep_alive_default())));

        tracing::debug!(
            backend = ?backend,
            max_total = self.config.pool.max_total,
            max_per_route = self.config.pool.max_per_route,
            "Client factory ready"
        );

        Ok(ClientFactory {
            config: self.config,
            backend,
            keep_alive,
            hostname_verifier: self.hostname_verifier,
            issued: Mutex::new(Vec::new()),
        })
    }
}

/// Hands out pooled HTTP clients.
pub struct ClientFactory {
    config: ClientConfig,
    backend: BackendKind,
    keep_alive: Arc<dyn KeepAliveStrategy>,
    hostname_verifier: Option<Arc<dyn HostnameVerifier>>,
    issued: Mutex<Vec<HttpClient>>,
}

impl ClientFactory {
    pub fn builder(config: ClientConfig) -> ClientFactoryBuilder {
        ClientFactoryBuilder {
            config,
            keep_alive: None,
            hostname_verifier: None,
            backend: None,
        }
    }

    /// Factory with default extension points.
    pub fn new(config: ClientConfig) -> Result<Self, InitError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Client trusting the platform store only, with default TLS negotiation.
    pub fn create_client(&self) -> Result<HttpClient, InitError> {
        let tls = crate::tls::platform_client_config()?;
        Ok(self.issue(&self.config.pool.name, tls))
    }

    /// Client using the configured trust material, hostname policy,
    /// client identity and pinned TLS version.
    ///
    /// Trust material is read from disk on every call.
    pub fn create_secure_client(&self) -> Result<HttpClient, InitError> {
        let trust = &self.config.trust;
        let material = TrustMaterial::from_config(trust)?;
        let hostname = self
            .hostname_verifier
            .clone()
            .unwrap_or_else(|| hostname::policy_for(trust));

        let tls = crate::tls::secure_client_config(trust, material, hostname)?;
        Ok(self.issue(&self.config.pool.secure_name, tls))
    }

    fn issue(&self, name: &str, tls: rustls::ClientConfig) -> HttpClient {
        let pool = &self.config.pool;
        let registry = SocketFactoryRegistry::new(pool.connect_timeout())
            .register(Scheme::Http, SocketFactory::Plain)
            .register(Scheme::Https, SocketFactory::Tls(TlsSocketFactory::new(Arc::new(tls))));

        let transport = match self.backend {
            BackendKind::Pooled => {
                Transport::Pooled(PooledTransport::new(name, pool, registry, Arc::clone(&self.keep_alive)))
            }
            BackendKind::Hyper => Transport::Hyper(HyperTransport::new(name, pool, registry)),
        };

        let client = HttpClient::new(name, transport);
        let mut issued = self.issued_clients();
        prune_closed(&mut issued);
        issued.push(client.clone());
        drop(issued);
        tracing::info!(pool = %name, backend = ?self.backend, "Client created");
        client
    }

    /// Issued clients that have not been closed yet.
    pub fn open_clients(&self) -> usize {
        let mut issued = self.issued_clients();
        prune_closed(&mut issued);
        issued.len()
    }

    fn issued_clients(&self) -> MutexGuard<'_, Vec<HttpClient>> {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close every client this factory issued.
    ///
    /// Each client is released independently; failures are logged and
    /// returned, and never stop the remaining releases.
    pub async fn close(&self) -> Vec<ReleaseError> {
        let clients = std::mem::take(&mut *self.issued_clients());

        let mut errors = Vec::new();
        for client in clients {
            if let Err(e) = client.close().await {
                tracing::error!(pool = %client.name(), error = %e, "Failed to release client");
                errors.push(e);
            }
        }
        errors
    }
}

/// Drop handles closed on their own so the factory does not keep their
/// pools and TLS configuration alive.
fn prune_closed(issued: &mut Vec<HttpClient>) {
    issued.retain(|client| client.state() != ClientState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_refused() {
        let mut config = ClientConfig::default();
        config.pool.max_total = 0;

        let err = ClientFactory::new(config).err().unwrap();
        assert!(matches!(err, InitError::Validation(_)));
    }

    #[test]
    fn builder_overrides_backend() {
        let factory = ClientFactory::builder(ClientConfig::default())
            .backend(BackendKind::Hyper)
            .build()
            .unwrap();
        assert_eq!(factory.backend(), BackendKind::Hyper);
    }

    #[tokio::test]
    async fn clients_are_named_and_start_uninitialized() {
        let factory = ClientFactory::new(ClientConfig::default()).unwrap();
        let plain = factory.create_client().unwrap();
        let secure = factory.create_secure_client().unwrap();

        assert_eq!(plain.name(), "http-pool");
        assert_eq!(secure.name(), "ssl-http-pool");
        assert_eq!(plain.state(), ClientState::Uninitialized);

        assert!(factory.close().await.is_empty());
        assert_eq!(plain.state(), ClientState::Closed);
        assert_eq!(secure.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn closed_clients_are_released_by_the_factory() {
        let factory = ClientFactory::new(ClientConfig::default()).unwrap();

        for _ in 0..50 {
            let client = factory.create_secure_client().unwrap();
            client.close().await.unwrap();
        }
        assert_eq!(factory.open_clients(), 0);
        assert!(factory.issued_clients().is_empty());

        let kept = factory.create_client().unwrap();
        let closed = factory.create_client().unwrap();
        closed.close().await.unwrap();
        let _fresh = factory.create_client().unwrap();
        assert_eq!(factory.issued_clients().len(), 2);
        assert_eq!(factory.open_clients(), 2);

        assert!(factory.close().await.is_empty());
        assert_eq!(kept.state(), ClientState::Closed);
        assert_eq!(factory.open_clients(), 0);
    }

    #[test]
    fn missing_trust_store_fails_construction() {
        let mut config = ClientConfig::default();
        config.trust.trust_store_path = Some("/nonexistent/ca.pem".into());

        let factory = ClientFactory::new(config).unwrap();
        let err = factory.create_secure_client().unwrap_err();
        assert!(matches!(err, InitError::TrustMaterial(_)));
    }
}
