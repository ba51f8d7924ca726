//! Pooled connection entries and live-connection accounting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1;
use tokio::time::Instant;

/// Global counter for connection IDs.
/// Relaxed ordering is sufficient: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pooled connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A connection the pool can hand out again.
pub trait Reusable: Send + 'static {
    /// False once the peer or the local side has closed the connection.
    fn is_open(&self) -> bool;
}

impl Reusable for http1::SendRequest<Full<Bytes>> {
    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

/// Counts open connections. Each entry holds a guard that decrements on drop.
#[derive(Debug, Clone, Default)]
pub(crate) struct LiveTracker {
    live: Arc<AtomicUsize>,
}

impl LiveTracker {
    pub(crate) fn track(&self) -> LiveGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.guard()
    }

    /// Count a new connection unless `limit` are already open.
    pub(crate) fn try_track(&self, limit: usize) -> Option<LiveGuard> {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| (live < limit).then_some(live + 1))
            .ok()?;
        Some(self.guard())
    }

    fn guard(&self) -> LiveGuard {
        LiveGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::new(),
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Tracks one connection's lifetime.
#[derive(Debug)]
pub(crate) struct LiveGuard {
    live: Arc<AtomicUsize>,
    id: ConnectionId,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// A connection owned by the pool, either idle or leased.
#[derive(Debug)]
pub(crate) struct PooledConnection<C> {
    pub(crate) conn: C,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    /// Set on release from the keep-alive strategy. `None` never expires.
    pub(crate) expires_at: Option<Instant>,
    guard: LiveGuard,
}

impl<C: Reusable> PooledConnection<C> {
    pub(crate) fn new(conn: C, guard: LiveGuard) -> Self {
        let now = Instant::now();
        Self {
            conn,
            created_at: now,
            last_used: now,
            expires_at: None,
            guard,
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.guard.id
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    /// Open and within its keep-alive.
    pub(crate) fn is_reusable(&self, now: Instant) -> bool {
        self.conn.is_open() && !self.is_expired(now)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::Reusable;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Connection stand-in whose open flag tests control.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct MockConnection {
        closed: Arc<AtomicBool>,
    }

    impl MockConnection {
        pub(crate) fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl Reusable for MockConnection {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
    }
}
