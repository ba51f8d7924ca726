//! Client subsystem.
//!
//! # Data Flow
//! ```text
//! ClientConfig
//!     → factory.rs (validate, pick backend, build TLS context + socket factories)
//!     → handle.rs (HttpClient: state machine, execute/close)
//!     → transport.rs
//!         Pooled: pool lease → http1 connection → keep-alive → release
//!         Hyper:  in-flight limit → hyper-util legacy client
//! ```
//!
//! # Design Decisions
//! - Extension points are explicit builder arguments
//! - Each handle owns its pool; closing one never affects another
//! - Responses are fully buffered; the connection goes back to the pool
//!   once the body is read

pub mod factory;
pub mod handle;
mod transport;

pub use factory::{ClientFactory, ClientFactoryBuilder};
pub use handle::HttpClient;
