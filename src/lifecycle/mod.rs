//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! State (state.rs):
//!     Uninitialized → (first request) → Pooling → (close) → Closed
//!
//! Shutdown (shutdown.rs):
//!     close() → signal sweep task → await its exit → release pool
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: cancel background work first, then release state
//! - Closing is idempotent; only the first caller releases
//! - Each client handle owns its lifecycle, nothing is process-global

pub mod shutdown;
pub mod state;

pub use shutdown::Shutdown;
pub use state::{ClientState, Lifecycle};
