//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(route)
//!     → route permit (≤ max_per_route) → total permit (≤ max_total)
//!     → newest reusable idle connection, or an empty slot to install into
//!     → Lease used by the transport
//!     → release(keep_alive from keep_alive.rs) back to idle, or drop to discard
//!
//! sweep.rs (every interval, after an initial delay):
//!     close_expired → close_idle(threshold)
//! ```
//!
//! # Design Decisions
//! - `PoolManager` owns one pool and its sweep; no process-wide registry
//! - Shutdown is cancel-then-release: the sweep is stopped and awaited
//!   before the pool is closed
//! - The pool is generic over the connection so it can be tested without sockets

pub mod connection;
pub mod keep_alive;
pub mod manager;
pub mod sweep;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::ReleaseError;

pub use connection::{ConnectionId, Reusable};
pub use keep_alive::{DefaultKeepAliveStrategy, KeepAliveStrategy};
pub use manager::{ConnectionPool, Lease, PoolLimits, PoolStats};
pub use sweep::{EvictionSweep, IdleConnectionEvictor, SweepSchedule, SweepTask};

/// One pool plus the sweep that evicts from it.
pub struct PoolManager<C> {
    pool: ConnectionPool<C>,
    sweep: Mutex<Option<EvictionSweep>>,
    ticks: Arc<AtomicU64>,
    shut_down: AtomicBool,
}

impl<C: Reusable> PoolManager<C> {
    pub fn new(name: impl Into<String>, limits: PoolLimits) -> Self {
        Self {
            pool: ConnectionPool::new(name, limits),
            sweep: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Start the eviction sweep. Returns false if it was already started or
    /// the manager has been shut down.
    pub fn start_eviction_sweep(&self, idle_threshold: Duration, schedule: SweepSchedule) -> bool {
        let mut slot = self.sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() || self.shut_down.load(Ordering::SeqCst) {
            return false;
        }

        let evictor = IdleConnectionEvictor::new(self.pool.clone(), idle_threshold, Arc::clone(&self.ticks));
        *slot = Some(EvictionSweep::start(self.pool.name(), Arc::new(evictor), schedule));
        true
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(EvictionSweep::is_running)
    }

    /// Completed sweep ticks.
    pub fn sweep_ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Stop the sweep, then close the pool. Idempotent.
    pub async fn shutdown(&self) -> Result<(), ReleaseError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sweep = self.sweep.lock().unwrap_or_else(PoisonError::into_inner).take();
        let cancelled = match sweep {
            Some(sweep) => sweep.cancel().await,
            None => Ok(()),
        };

        let closed = self.pool.close_all();
        tracing::info!(pool = %self.pool.name(), closed, "Connection pool shut down");
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connection::mock::MockConnection;

    fn manager() -> PoolManager<MockConnection> {
        PoolManager::new(
            "test",
            PoolLimits {
                max_total: 4,
                max_per_route: 2,
                acquire_timeout: Duration::from_millis(100),
            },
        )
    }

    fn schedule() -> SweepSchedule {
        SweepSchedule {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_starts_once() {
        let manager = manager();
        assert!(manager.start_eviction_sweep(Duration::from_secs(30), schedule()));
        assert!(!manager.start_eviction_sweep(Duration::from_secs(30), schedule()));
        assert!(manager.is_sweeping());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(manager.sweep_ticks(), 2);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_ticks_and_is_idempotent() {
        let manager = manager();
        manager.start_eviction_sweep(Duration::from_secs(30), schedule());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        manager.shutdown().await.unwrap();
        let ticks = manager.sweep_ticks();
        assert!(!manager.is_sweeping());
        assert!(manager.pool().is_closed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.sweep_ticks(), ticks);

        manager.shutdown().await.unwrap();
        assert!(!manager.start_eviction_sweep(Duration::from_secs(30), schedule()));
    }

    #[tokio::test]
    async fn shutdown_without_sweep() {
        let manager = manager();
        manager.shutdown().await.unwrap();
        assert!(manager.pool().is_closed());
        assert_eq!(manager.sweep_ticks(), 0);
    }
}
