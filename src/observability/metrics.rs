//! Pool and client metrics.
//!
//! # Metrics
//! - `http_pool_connections_created_total` (counter): sockets opened
//! - `http_pool_connections_reused_total` (counter): leases served from idle
//! - `http_pool_connections_evicted_total` (counter): by `reason` (expired, idle, capacity, closed)
//! - `http_pool_exhausted_total` (counter): acquires that timed out
//! - `http_client_trust_rejections_total` (counter): handshakes failing certificate trust
//! - `http_pool_connections_live` (gauge): open sockets
//! - `http_pool_connections_idle` (gauge): sockets parked in the pool
//!
//! Every metric carries a `pool` label. Only the `metrics` facade is used;
//! the embedding application installs the recorder/exporter.

pub fn record_connection_created(pool: &str) {
    ::metrics::counter!("http_pool_connections_created_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_connection_reused(pool: &str) {
    ::metrics::counter!("http_pool_connections_reused_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_evicted(pool: &str, reason: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    ::metrics::counter!(
        "http_pool_connections_evicted_total",
        "pool" => pool.to_string(),
        "reason" => reason
    )
    .increment(count as u64);
}

pub fn record_pool_exhausted(pool: &str) {
    ::metrics::counter!("http_pool_exhausted_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_trust_rejection(pool: &str) {
    ::metrics::counter!("http_client_trust_rejections_total", "pool" => pool.to_string()).increment(1);
}

pub fn set_pool_gauges(pool: &str, live: usize, idle: usize) {
    ::metrics::gauge!("http_pool_connections_live", "pool" => pool.to_string()).set(live as f64);
    ::metrics::gauge!("http_pool_connections_idle", "pool" => pool.to_string()).set(idle as f64);
}
