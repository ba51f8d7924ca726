//! Bounded connection pool keyed by route.
//!
//! # Responsibilities
//! - Enforce `max_total` and `max_per_route` on leased connections
//! - Park released connections per route until reused or evicted
//! - Evict expired and idle connections on request (sweep)
//! - Fail waiting acquirers with `PoolExhausted` at the deadline
//!
//! # Design Decisions
//! - A lease holds a route permit and a total permit; idle connections hold none
//! - Route permit is taken before the total permit so a saturated route
//!   never blocks other routes
//! - New sockets are only opened when the route has no reusable idle
//!   connection, so sockets per route stay within `max_per_route`
//! - Opening a socket at `max_total` live sockets closes the oldest idle
//!   connection first
//! - Reuse is LIFO: the most recently released connection is the warmest

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::ClientError;
use crate::net::route::Route;
use crate::observability::metrics;
use crate::pool::connection::{LiveGuard, LiveTracker, PooledConnection, Reusable};

/// Capacity limits of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_total: usize,
    pub max_per_route: usize,
    /// Longest wait for a lease before `PoolExhausted`.
    pub acquire_timeout: Duration,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections, idle or leased.
    pub live: usize,
    pub idle: usize,
    pub leased: usize,
    pub routes: usize,
    pub created: u64,
    pub reused: u64,
    pub evicted_expired: u64,
    pub evicted_idle: u64,
    pub exhausted: u64,
}

struct RoutePool<C> {
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<PooledConnection<C>>>,
}

impl<C> RoutePool<C> {
    fn idle(&self) -> MutexGuard<'_, VecDeque<PooledConnection<C>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct Counters {
    idle: AtomicUsize,
    leased: AtomicUsize,
    created: AtomicU64,
    reused: AtomicU64,
    evicted_expired: AtomicU64,
    evicted_idle: AtomicU64,
    exhausted: AtomicU64,
}

struct PoolInner<C> {
    name: String,
    limits: PoolLimits,
    total: Arc<Semaphore>,
    routes: DashMap<Route, Arc<RoutePool<C>>>,
    live: LiveTracker,
    counters: Counters,
    closed: AtomicBool,
}

impl<C: Reusable> PoolInner<C> {
    fn route_pool(&self, route: &Route) -> Arc<RoutePool<C>> {
        self.routes
            .entry(route.clone())
            .or_insert_with(|| {
                Arc::new(RoutePool {
                    permits: Arc::new(Semaphore::new(self.limits.max_per_route)),
                    idle: Mutex::new(VecDeque::new()),
                })
            })
            .clone()
    }

    fn route_pools(&self) -> Vec<(Route, Arc<RoutePool<C>>)> {
        self.routes
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    fn publish_gauges(&self) {
        metrics::set_pool_gauges(&self.name, self.live.live(), self.counters.idle.load(Ordering::SeqCst));
    }

    /// Newest reusable idle connection of a route; stale ones are dropped.
    fn checkout(&self, route_pool: &RoutePool<C>) -> Option<PooledConnection<C>> {
        let now = Instant::now();
        let mut stale = 0;
        let found = {
            let mut idle = route_pool.idle();
            loop {
                let Some(entry) = idle.pop_back() else {
                    break None;
                };
                self.counters.idle.fetch_sub(1, Ordering::SeqCst);
                if entry.is_reusable(now) {
                    break Some(entry);
                }
                tracing::trace!(pool = %self.name, connection_id = %entry.id(), "Discarding stale idle connection");
                stale += 1;
            }
        };

        if stale > 0 {
            self.counters.evicted_expired.fetch_add(stale as u64, Ordering::SeqCst);
            metrics::record_evicted(&self.name, "expired", stale);
            self.publish_gauges();
        }
        found
    }

    /// Close idle connections so a new socket fits the limits, and count it
    /// as live. The live slot is claimed atomically against `max_total`.
    fn reserve_live(&self, route: &Route, route_pool: &RoutePool<C>) -> LiveGuard {
        {
            let mut idle = route_pool.idle();
            let leased = self
                .limits
                .max_per_route
                .saturating_sub(route_pool.permits.available_permits());
            while !idle.is_empty() && idle.len() + leased > self.limits.max_per_route {
                idle.pop_front();
                self.counters.idle.fetch_sub(1, Ordering::SeqCst);
                metrics::record_evicted(&self.name, "capacity", 1);
            }
        }

        loop {
            if let Some(guard) = self.live.try_track(self.limits.max_total) {
                return guard;
            }
            if self.evict_oldest_idle() {
                tracing::debug!(pool = %self.name, route = %route, "Closed oldest idle connection to stay within max_total");
                continue;
            }
            // only while another lease is still dropping its connection
            tracing::warn!(pool = %self.name, route = %route, live = self.live.live(), "No idle connection to close at max_total");
            return self.live.track();
        }
    }

    fn evict_oldest_idle(&self) -> bool {
        let oldest = self
            .route_pools()
            .into_iter()
            .filter_map(|(_, pool)| {
                let last_used = pool.idle().front().map(|entry| entry.last_used);
                last_used.map(|at| (at, pool))
            })
            .min_by_key(|(at, _)| *at);

        match oldest {
            Some((_, pool)) => {
                let evicted = pool.idle().pop_front().is_some();
                if evicted {
                    self.counters.idle.fetch_sub(1, Ordering::SeqCst);
                    metrics::record_evicted(&self.name, "capacity", 1);
                }
                evicted
            }
            None => false,
        }
    }

    /// Remove idle connections matching `stale`. Returns how many were closed.
    fn evict_where(&self, stale: impl Fn(&PooledConnection<C>) -> bool) -> usize {
        let mut evicted = 0;
        for (_, pool) in self.route_pools() {
            let mut idle = pool.idle();
            let before = idle.len();
            idle.retain(|entry| !stale(entry));
            evicted += before - idle.len();
        }
        if evicted > 0 {
            self.counters.idle.fetch_sub(evicted, Ordering::SeqCst);
        }
        evicted
    }
}

/// A bounded, route-keyed connection pool. Cheap to clone.
pub struct ConnectionPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Reusable> ConnectionPool<C> {
    /// Create an empty pool.
    pub fn new(name: impl Into<String>, limits: PoolLimits) -> Self {
        let name = name.into();
        tracing::debug!(
            pool = %name,
            max_total = limits.max_total,
            max_per_route = limits.max_per_route,
            acquire_timeout_ms = limits.acquire_timeout.as_millis() as u64,
            "Connection pool created"
        );

        Self {
            inner: Arc::new(PoolInner {
                name,
                limits,
                total: Arc::new(Semaphore::new(limits.max_total)),
                routes: DashMap::new(),
                live: LiveTracker::default(),
                counters: Counters::default(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn limits(&self) -> PoolLimits {
        self.inner.limits
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Lease a slot for `route`, with the newest reusable idle connection if any.
    ///
    /// Waits at most `acquire_timeout` for both permits. No retry.
    pub async fn acquire(&self, route: &Route) -> Result<Lease<C>, ClientError> {
        let inner = &self.inner;
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let route_pool = inner.route_pool(route);
        let started = Instant::now();
        let permits = tokio::time::timeout_at(started + inner.limits.acquire_timeout, async {
            let route_permit = Arc::clone(&route_pool.permits).acquire_owned().await?;
            let total_permit = Arc::clone(&inner.total).acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>((route_permit, total_permit))
        })
        .await;

        let (route_permit, total_permit) = match permits {
            Ok(Ok(permits)) => permits,
            Ok(Err(_)) => return Err(ClientError::Closed),
            Err(_) => {
                let waited = started.elapsed();
                inner.counters.exhausted.fetch_add(1, Ordering::SeqCst);
                metrics::record_pool_exhausted(&inner.name);
                tracing::warn!(pool = %inner.name, route = %route, waited_ms = waited.as_millis() as u64, "Connection pool exhausted");
                return Err(ClientError::PoolExhausted {
                    route: route.clone(),
                    waited,
                });
            }
        };
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let conn = inner.checkout(&route_pool);
        if let Some(entry) = &conn {
            inner.counters.reused.fetch_add(1, Ordering::SeqCst);
            metrics::record_connection_reused(&inner.name);
            tracing::trace!(pool = %inner.name, route = %route, connection_id = %entry.id(), "Reusing idle connection");
        }
        inner.counters.leased.fetch_add(1, Ordering::SeqCst);

        Ok(Lease {
            pool: Arc::clone(inner),
            route_pool,
            route: route.clone(),
            conn,
            _route_permit: route_permit,
            _total_permit: total_permit,
        })
    }

    /// Close idle connections whose keep-alive has run out.
    pub fn close_expired(&self) -> usize {
        let now = Instant::now();
        let evicted = self.inner.evict_where(|entry| !entry.is_reusable(now));
        if evicted > 0 {
            self.inner.counters.evicted_expired.fetch_add(evicted as u64, Ordering::SeqCst);
            metrics::record_evicted(&self.inner.name, "expired", evicted);
            self.inner.publish_gauges();
        }
        evicted
    }

    /// Close idle connections unused for at least `threshold`.
    pub fn close_idle(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let evicted = self.inner.evict_where(|entry| entry.idle_for(now) >= threshold);
        if evicted > 0 {
            self.inner.counters.evicted_idle.fetch_add(evicted as u64, Ordering::SeqCst);
            metrics::record_evicted(&self.inner.name, "idle", evicted);
            self.inner.publish_gauges();
        }
        evicted
    }

    /// Close the pool: wake waiters, drop idle connections, refuse new leases.
    ///
    /// Outstanding leases discard their connection on release.
    pub fn close_all(&self) -> usize {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::SeqCst);
        inner.total.close();

        let mut closed = 0;
        for (_, pool) in inner.route_pools() {
            pool.permits.close();
            let mut idle = pool.idle();
            closed += idle.len();
            idle.clear();
        }
        inner.counters.idle.store(0, Ordering::SeqCst);
        metrics::record_evicted(&inner.name, "closed", closed);
        inner.publish_gauges();

        tracing::debug!(pool = %inner.name, closed, "Connection pool closed");
        closed
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        PoolStats {
            live: self.inner.live.live(),
            idle: c.idle.load(Ordering::SeqCst),
            leased: c.leased.load(Ordering::SeqCst),
            routes: self.inner.routes.len(),
            created: c.created.load(Ordering::SeqCst),
            reused: c.reused.load(Ordering::SeqCst),
            evicted_expired: c.evicted_expired.load(Ordering::SeqCst),
            evicted_idle: c.evicted_idle.load(Ordering::SeqCst),
            exhausted: c.exhausted.load(Ordering::SeqCst),
        }
    }
}

/// Exclusive use of one pool slot on a route.
///
/// Dropping a lease without [`Lease::release`] closes its connection.
pub struct Lease<C: Reusable> {
    pool: Arc<PoolInner<C>>,
    route_pool: Arc<RoutePool<C>>,
    route: Route,
    conn: Option<PooledConnection<C>>,
    _route_permit: OwnedSemaphorePermit,
    _total_permit: OwnedSemaphorePermit,
}

impl<C: Reusable> Lease<C> {
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The leased connection, if the slot came with one.
    pub fn connection_mut(&mut self) -> Option<&mut C> {
        self.conn.as_mut().map(|entry| &mut entry.conn)
    }

    /// Put a freshly opened connection into this slot.
    pub fn install(&mut self, conn: C) -> &mut C {
        let pool = &self.pool;
        let guard = pool.reserve_live(&self.route, &self.route_pool);

        let entry = PooledConnection::new(conn, guard);
        pool.counters.created.fetch_add(1, Ordering::SeqCst);
        metrics::record_connection_created(&pool.name);
        tracing::debug!(pool = %pool.name, route = %self.route, connection_id = %entry.id(), "New pooled connection");
        pool.publish_gauges();

        &mut self.conn.insert(entry).conn
    }

    /// Return the connection to the pool for at most `keep_alive`.
    pub fn release(mut self, keep_alive: Duration) {
        let Some(mut entry) = self.conn.take() else {
            return;
        };
        let pool = &self.pool;
        if !entry.conn.is_open() {
            tracing::trace!(pool = %pool.name, connection_id = %entry.id(), "Released connection already closed");
            return;
        }

        let now = Instant::now();
        entry.last_used = now;
        // beyond the clock's range: no keep-alive expiry, the idle sweep still applies
        entry.expires_at = now.checked_add(keep_alive);

        let mut idle = self.route_pool.idle();
        // checked under the route lock so close_all cannot miss it
        if pool.closed.load(Ordering::SeqCst) {
            return;
        }
        idle.push_back(entry);
        pool.counters.idle.fetch_add(1, Ordering::SeqCst);
        drop(idle);
        pool.publish_gauges();
    }
}

impl<C: Reusable> Drop for Lease<C> {
    fn drop(&mut self) {
        self.pool.counters.leased.fetch_sub(1, Ordering::SeqCst);
        if let Some(entry) = self.conn.take() {
            tracing::debug!(
                pool = %self.pool.name,
                route = %self.route,
                connection_id = %entry.id(),
                age_ms = entry.created_at.elapsed().as_millis() as u64,
                "Discarding leased connection"
            );
            drop(entry);
            self.pool.publish_gauges();
        }
    }
}
