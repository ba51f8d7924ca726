//! Pooled HTTP client library.
//!
//! Hands out pre-configured HTTP clients backed by a bounded connection pool,
//! with platform trust, custom trust stores, hostname allow-lists and mutual TLS.

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod tls;

pub use client::{ClientFactory, ClientFactoryBuilder, HttpClient};
pub use config::schema::ClientConfig;
pub use error::{ClientError, InitError, ReleaseError};
pub use lifecycle::ClientState;
pub use pool::PoolStats;
