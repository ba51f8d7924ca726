//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pool / client / tls produce:
//!     → logging.rs (structured tracing events, `pool` and `route` fields)
//!     → metrics.rs (counters and gauges through the `metrics` facade)
//!
//! Consumers:
//!     → whatever subscriber and recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Libraries emit, applications install
//! - Metrics are cheap when no recorder is set

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
