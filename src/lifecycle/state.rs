//! Client handle state machine.
//!
//! ```text
//! Uninitialized ──first request──▶ Pooling ──close()──▶ Closed
//!       └───────────────close()───────────────────────────┘
//! ```
//!
//! `Closed` is terminal. Reads are lock-free; transitions are serialised
//! through an async gate so start and close never interleave.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Created, pool empty, no sweep running.
    Uninitialized,
    /// Serving requests; eviction sweep active.
    Pooling,
    /// Released. Requests fail with `ClientError::Closed`.
    Closed,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Uninitialized,
            1 => ClientState::Pooling,
            _ => ClientState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ClientState::Uninitialized => 0,
            ClientState::Pooling => 1,
            ClientState::Closed => 2,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Uninitialized => "uninitialized",
            ClientState::Pooling => "pooling",
            ClientState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomic [`ClientState`] with a transition gate.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    gate: Mutex<()>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ClientState::Uninitialized.as_u8()),
            gate: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Hold while inspecting and changing state.
    pub async fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Move to `next`. Leaving `Closed` is refused.
    pub fn advance(&self, _gate: &MutexGuard<'_, ()>, next: ClientState) -> bool {
        let current = self.state();
        if current == ClientState::Closed && next != ClientState::Closed {
            return false;
        }
        self.state.store(next.as_u8(), Ordering::Release);
        tracing::trace!(from = %current, to = %next, "Client state transition");
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
