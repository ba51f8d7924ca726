//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Request URI
//!     → route.rs (scheme, host, port)
//!     → socket.rs (registry lookup by scheme, TCP connect, optional TLS handshake)
//!     → stream.rs (MaybeTlsStream wrapped as hyper I/O)
//!     → Hand off to the pool (http1 handshake) or the hyper-util client
//! ```
//!
//! # Design Decisions
//! - One registry per client: `http` → plain, `https` → TLS
//! - Connect and handshake share one timeout
//! - Certificate rejections surface as `ClientError::Trust`, not I/O errors

pub mod route;
pub mod socket;
pub mod stream;

pub use route::{Route, Scheme};
pub use socket::{SocketFactory, SocketFactoryRegistry, TlsSocketFactory};
pub use stream::{MaybeTlsStream, PooledIo};
