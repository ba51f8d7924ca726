//! Background eviction sweep.
//!
//! # Responsibilities
//! - Periodically close expired connections, then idle ones
//! - Exactly one task per pool, started lazily and cancelled on shutdown
//!
//! # Design Decisions
//! - Missed ticks are delayed, never bunched up
//! - Cancellation is signalled, then the task is awaited, so no tick can
//!   run against a released pool

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::PoolConfig;
use crate::error::ReleaseError;
use crate::lifecycle::Shutdown;
use crate::pool::connection::Reusable;
use crate::pool::manager::ConnectionPool;

/// Work performed on each sweep tick.
pub trait SweepTask: Send + Sync + 'static {
    fn sweep(&self);
}

/// When sweep ticks happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSchedule {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl From<&PoolConfig> for SweepSchedule {
    fn from(config: &PoolConfig) -> Self {
        Self {
            initial_delay: config.sweep_initial_delay(),
            interval: config.sweep_interval(),
        }
    }
}

/// Closes expired, then idle, connections of one pool.
pub struct IdleConnectionEvictor<C> {
    pool: ConnectionPool<C>,
    idle_threshold: Duration,
    ticks: Arc<AtomicU64>,
}

impl<C: Reusable> IdleConnectionEvictor<C> {
    pub fn new(pool: ConnectionPool<C>, idle_threshold: Duration, ticks: Arc<AtomicU64>) -> Self {
        Self {
            pool,
            idle_threshold,
            ticks,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl<C: Reusable> SweepTask for IdleConnectionEvictor<C> {
    fn sweep(&self) {
        let expired = self.pool.close_expired();
        let idle = self.pool.close_idle(self.idle_threshold);
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::debug!(
            pool = %self.pool.name(),
            tick,
            expired,
            idle,
            remaining_idle = self.pool.stats().idle,
            "Eviction sweep"
        );
    }
}

/// Handle of a running sweep task.
pub struct EvictionSweep {
    name: String,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl EvictionSweep {
    /// Spawn the sweep loop on the current runtime.
    pub fn start(name: impl Into<String>, task: Arc<dyn SweepTask>, schedule: SweepSchedule) -> Self {
        let name = name.into();
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();

        tracing::debug!(
            pool = %name,
            initial_delay_ms = schedule.initial_delay.as_millis() as u64,
            interval_ms = schedule.interval.as_millis() as u64,
            "Starting eviction sweep"
        );
        let handle = tokio::spawn(run(task, schedule, rx));

        Self { name, shutdown, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task and wait for it to exit.
    pub async fn cancel(self) -> Result<(), ReleaseError> {
        self.shutdown.trigger();
        match self.handle.await {
            Ok(()) => {
                tracing::debug!(pool = %self.name, "Eviction sweep stopped");
                Ok(())
            }
            Err(e) => Err(ReleaseError {
                pool: self.name,
                reason: format!("eviction sweep task failed: {}", e),
            }),
        }
    }
}

async fn run(task: Arc<dyn SweepTask>, schedule: SweepSchedule, mut shutdown: broadcast::Receiver<()>) {
    let start = time::Instant::now() + schedule.initial_delay;
    let mut ticker = time::interval_at(start, schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => task.sweep(),
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::route::{Route, Scheme};
    use crate::pool::connection::mock::MockConnection;
    use crate::pool::manager::PoolLimits;

    #[derive(Default)]
    struct Counting(AtomicU64);

    impl SweepTask for Counting {
        fn sweep(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn schedule() -> SweepSchedule {
        SweepSchedule {
            initial_delay: Duration::from_secs(10),
            interval: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_schedule_and_stop_on_cancel() {
        let task = Arc::new(Counting::default());
        let sweep = EvictionSweep::start("test", task.clone(), schedule());

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(task.0.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(26)).await;
        assert_eq!(task.0.load(Ordering::SeqCst), 3);

        sweep.cancel().await.unwrap();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(task.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn evictor_removes_stale_keeps_recent() {
        let pool = ConnectionPool::new(
            "test",
            PoolLimits {
                max_total: 10,
                max_per_route: 5,
                acquire_timeout: Duration::from_millis(100),
            },
        );
        let (old, recent) = (Route::new(Scheme::Http, "old", 80), Route::new(Scheme::Http, "recent", 80));

        let mut lease = pool.acquire(&old).await.unwrap();
        lease.install(MockConnection::default());
        lease.release(Duration::from_secs(900));

        time::advance(Duration::from_secs(25)).await;
        let mut lease = pool.acquire(&recent).await.unwrap();
        lease.install(MockConnection::default());
        lease.release(Duration::from_secs(900));

        let ticks = Arc::new(AtomicU64::new(0));
        let evictor = IdleConnectionEvictor::new(pool.clone(), Duration::from_secs(30), ticks.clone());

        time::advance(Duration::from_secs(6)).await;
        evictor.sweep();

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.evicted_idle, 1);
        assert_eq!(evictor.ticks(), 1);

        let mut lease = pool.acquire(&recent).await.unwrap();
        assert!(lease.connection_mut().is_some());
    }
}
