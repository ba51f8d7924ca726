//! Request transports behind a client handle.
//!
//! - `Pooled`: the crate's own pool, driving one `http1` connection per lease
//! - `Hyper`: `hyper_util`'s legacy client over the same socket factories

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, HOST};
use http::{Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::error::{ClientError, ReleaseError};
use crate::net::route::Route;
use crate::net::socket::SocketFactoryRegistry;
use crate::net::stream::PooledIo;
use crate::observability::metrics;
use crate::pool::keep_alive::{closes_connection, KeepAliveStrategy};
use crate::pool::{PoolLimits, PoolManager, PoolStats, SweepSchedule};

type Sender = http1::SendRequest<Full<Bytes>>;

pub(crate) enum Transport {
    Pooled(PooledTransport),
    Hyper(HyperTransport),
}

impl Transport {
    pub(crate) async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, ClientError> {
        let (name, result) = match self {
            Transport::Pooled(t) => (t.name(), t.send(request).await),
            Transport::Hyper(t) => (t.name.as_str(), t.send(request).await),
        };
        if let Err(e) = &result {
            if e.is_trust() {
                metrics::record_trust_rejection(name);
            }
        }
        result
    }

    /// Begin pooling: start background work, if any.
    pub(crate) fn start(&self) {
        match self {
            Transport::Pooled(t) => {
                t.manager.start_eviction_sweep(t.idle_threshold, t.schedule);
            }
            Transport::Hyper(_) => {}
        }
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ReleaseError> {
        match self {
            Transport::Pooled(t) => t.manager.shutdown().await,
            Transport::Hyper(t) => {
                t.shutdown();
                Ok(())
            }
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        match self {
            Transport::Pooled(t) => t.manager.pool().stats(),
            Transport::Hyper(t) => t.stats(),
        }
    }

    pub(crate) fn sweep_ticks(&self) -> u64 {
        match self {
            Transport::Pooled(t) => t.manager.sweep_ticks(),
            Transport::Hyper(_) => 0,
        }
    }
}

pub(crate) struct PooledTransport {
    manager: PoolManager<Sender>,
    registry: SocketFactoryRegistry,
    keep_alive: Arc<dyn KeepAliveStrategy>,
    read_timeout: Duration,
    idle_threshold: Duration,
    schedule: SweepSchedule,
}

impl PooledTransport {
    pub(crate) fn new(
        name: &str,
        config: &PoolConfig,
        registry: SocketFactoryRegistry,
        keep_alive: Arc<dyn KeepAliveStrategy>,
    ) -> Self {
        let limits = PoolLimits {
            max_total: config.max_total,
            max_per_route: config.max_per_route,
            acquire_timeout: config.request_timeout(),
        };
        Self {
            manager: PoolManager::new(name, limits),
            registry,
            keep_alive,
            read_timeout: config.read_timeout(),
            idle_threshold: config.idle_eviction_threshold(),
            schedule: SweepSchedule::from(config),
        }
    }

    fn name(&self) -> &str {
        self.manager.pool().name()
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, ClientError> {
        let route = Route::from_uri(request.uri())?;
        let request = into_origin_form(request, &route)?;

        let mut lease = self.manager.pool().acquire(&route).await?;
        let result = match lease.connection_mut() {
            Some(sender) => dispatch(sender, request, &route, self.read_timeout).await,
            None => {
                let sender = self.open(&route).await?;
                dispatch(lease.install(sender), request, &route, self.read_timeout).await
            }
        };

        // on error the lease is dropped and the connection discarded
        let response = result?;
        if closes_connection(response.headers()) {
            drop(lease);
        } else {
            lease.release(self.keep_alive.keep_alive(response.headers()));
        }
        Ok(response)
    }

    async fn open(&self, route: &Route) -> Result<Sender, ClientError> {
        let stream = self.registry.connect(route).await?;
        let (sender, connection) = http1::handshake(PooledIo::new(stream)).await?;

        let route = route.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(route = %route, error = %e, "Connection driver ended with error");
            }
        });
        Ok(sender)
    }
}

/// Rewrite an absolute-form request for an origin server.
fn into_origin_form(mut request: Request<Full<Bytes>>, route: &Route) -> Result<Request<Full<Bytes>>, ClientError> {
    let path: Uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .parse()
        .map_err(|e| ClientError::InvalidRequest(format!("bad request path: {}", e)))?;
    *request.uri_mut() = path;

    if !request.headers().contains_key(HOST) {
        let host = HeaderValue::from_str(&route.authority())
            .map_err(|e| ClientError::InvalidRequest(format!("bad host '{}': {}", route.authority(), e)))?;
        request.headers_mut().insert(HOST, host);
    }
    Ok(request)
}

async fn dispatch(
    sender: &mut Sender,
    request: Request<Full<Bytes>>,
    route: &Route,
    read_timeout: Duration,
) -> Result<Response<Bytes>, ClientError> {
    sender.ready().await?;
    let response = tokio::time::timeout(read_timeout, sender.send_request(request))
        .await
        .map_err(|_| read_timeout_error(route, read_timeout))??;
    collect(response, route, read_timeout).await
}

async fn collect(response: Response<Incoming>, route: &Route, read_timeout: Duration) -> Result<Response<Bytes>, ClientError> {
    let (parts, body) = response.into_parts();
    let body = tokio::time::timeout(read_timeout, body.collect())
        .await
        .map_err(|_| read_timeout_error(route, read_timeout))??
        .to_bytes();
    Ok(Response::from_parts(parts, body))
}

fn read_timeout_error(route: &Route, timeout: Duration) -> ClientError {
    ClientError::ReadTimeout {
        route: route.clone(),
        timeout,
    }
}

pub(crate) struct HyperTransport {
    name: String,
    client: Mutex<Option<Client<SocketFactoryRegistry, Full<Bytes>>>>,
    in_flight: Arc<Semaphore>,
    max_total: usize,
    acquire_timeout: Duration,
    read_timeout: Duration,
}

impl HyperTransport {
    pub(crate) fn new(name: &str, config: &PoolConfig, registry: SocketFactoryRegistry) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.keep_alive_default())
            .pool_max_idle_per_host(config.max_per_route)
            .pool_timer(TokioTimer::new())
            .build(registry);

        Self {
            name: name.to_string(),
            client: Mutex::new(Some(client)),
            in_flight: Arc::new(Semaphore::new(config.max_total)),
            max_total: config.max_total,
            acquire_timeout: config.request_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, ClientError> {
        let route = Route::from_uri(request.uri())?;
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::Closed)?;

        let started = Instant::now();
        let _permit = match tokio::time::timeout(self.acquire_timeout, Arc::clone(&self.in_flight).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ClientError::Closed),
            Err(_) => {
                metrics::record_pool_exhausted(&self.name);
                tracing::warn!(pool = %self.name, route = %route, "Request limit reached");
                return Err(ClientError::PoolExhausted {
                    route,
                    waited: started.elapsed(),
                });
            }
        };

        let response = tokio::time::timeout(self.read_timeout, client.request(request))
            .await
            .map_err(|_| read_timeout_error(&route, self.read_timeout))?
            .map_err(|e| ClientError::find_in_chain(&e).unwrap_or(ClientError::Transport(e)))?;
        collect(response, &route, self.read_timeout).await
    }

    fn shutdown(&self) {
        self.in_flight.close();
        // dropping the client releases its idle connections
        let client = self.client.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(client);
        tracing::info!(pool = %self.name, "Connection pool shut down");
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            leased: self.max_total.saturating_sub(self.in_flight.available_permits()),
            ..PoolStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::route::Scheme;

    #[test]
    fn origin_form_adds_host() {
        let request = Request::get("http://example.com:8080/a/b?c=d").body(Full::new(Bytes::new())).unwrap();
        let route = Route::from_uri(request.uri()).unwrap();

        let request = into_origin_form(request, &route).unwrap();
        assert_eq!(request.uri(), "/a/b?c=d");
        assert_eq!(request.headers()[HOST], "example.com:8080");
    }

    #[test]
    fn origin_form_keeps_explicit_host() {
        let request = Request::get("https://example.com")
            .header(HOST, "virtual.example")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let route = Route::new(Scheme::Https, "example.com", 443);

        let request = into_origin_form(request, &route).unwrap();
        assert_eq!(request.uri(), "/");
        assert_eq!(request.headers()[HOST], "virtual.example");
    }
}
