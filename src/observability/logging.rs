//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for binaries and tests
//! - Honour `RUST_LOG` over the configured level
//!
//! The library itself only emits events; it never installs a subscriber.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global `fmt` subscriber filtered at `level`.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(level: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pooled_http={level},warn")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
