//! Client handle returned by the factory.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, Uri};
use http_body_util::Full;

use crate::client::transport::Transport;
use crate::error::{ClientError, ReleaseError};
use crate::lifecycle::{ClientState, Lifecycle};
use crate::pool::PoolStats;

struct ClientInner {
    name: String,
    transport: Transport,
    lifecycle: Lifecycle,
}

/// A pooled HTTP client. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    pub(crate) fn new(name: impl Into<String>, transport: Transport) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                transport,
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    /// Pool name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> ClientState {
        self.inner.lifecycle.state()
    }

    /// Send a request and read the whole response body.
    ///
    /// The URI must be absolute (`http` or `https`). The first request on a
    /// handle starts pooling.
    pub async fn execute(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, ClientError> {
        match self.state() {
            ClientState::Closed => return Err(ClientError::Closed),
            ClientState::Uninitialized => self.start().await?,
            ClientState::Pooling => {}
        }
        self.inner.transport.send(request).await
    }

    /// `GET` with an empty body.
    pub async fn get(&self, uri: &str) -> Result<Response<Bytes>, ClientError> {
        let uri: Uri = uri
            .parse()
            .map_err(|e| ClientError::InvalidRequest(format!("invalid URI '{}': {}", uri, e)))?;
        let request = Request::get(uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        self.execute(request).await
    }

    async fn start(&self) -> Result<(), ClientError> {
        let lifecycle = &self.inner.lifecycle;
        let gate = lifecycle.gate().await;
        match lifecycle.state() {
            ClientState::Closed => Err(ClientError::Closed),
            ClientState::Pooling => Ok(()),
            ClientState::Uninitialized => {
                self.inner.transport.start();
                lifecycle.advance(&gate, ClientState::Pooling);
                tracing::info!(pool = %self.inner.name, "Client pooling started");
                Ok(())
            }
        }
    }

    /// Release the pool and stop background work.
    ///
    /// Idempotent: later and concurrent calls return `Ok` without doing anything.
    pub async fn close(&self) -> Result<(), ReleaseError> {
        let lifecycle = &self.inner.lifecycle;
        let gate = lifecycle.gate().await;
        if lifecycle.state() == ClientState::Closed {
            return Ok(());
        }

        lifecycle.advance(&gate, ClientState::Closed);
        let result = self.inner.transport.shutdown().await;
        match &result {
            Ok(()) => tracing::info!(pool = %self.inner.name, "Client closed"),
            Err(e) => tracing::warn!(pool = %self.inner.name, error = %e, "Client closed with errors"),
        }
        result
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.transport.stats()
    }

    /// Eviction sweep ticks completed so far.
    pub fn sweep_ticks(&self) -> u64 {
        self.inner.transport.sweep_ticks()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
