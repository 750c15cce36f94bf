//! Readiness and shutdown state
//!
//! Both flags live behind one lock so a transition is applied as a pair.
//! Otherwise a `signal_not_ready` racing the shutdown freeze could clear
//! `ready` after the freeze set it.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Point-in-time view of the service state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StateSnapshot {
    pub ready: bool,
    pub shutting_down: bool,
}

/// Lifecycle phase as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotReady,
    Ready,
    ShuttingDown,
}

impl StateSnapshot {
    pub fn phase(&self) -> Phase {
        if self.shutting_down {
            Phase::ShuttingDown
        } else if self.ready {
            Phase::Ready
        } else {
            Phase::NotReady
        }
    }
}

/// Shared readiness/shutdown state
///
/// Starts not ready. `shutting_down` is terminal: once set, readiness calls
/// are ignored for the rest of the instance's life.
#[derive(Debug, Clone, Default)]
pub struct ServiceState {
    inner: Arc<Mutex<StateSnapshot>>,
}

impl ServiceState {
    /// Create a new state (not ready, not shutting down)
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StateSnapshot> {
        // Flags are plain bools, a poisoned guard still holds a valid pair
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the service as ready to receive traffic
    pub fn signal_ready(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            warn!("server is already shutting down");
            return;
        }
        if state.ready {
            warn!("server is already in a SERVER_IS_READY state");
        }
        info!("signaling that the server is ready");
        state.ready = true;
    }

    /// Mark the service as not ready to receive traffic
    pub fn signal_not_ready(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            warn!("server is already shutting down");
            return;
        }
        if !state.ready {
            warn!("server is already in a SERVER_IS_NOT_READY state");
        }
        info!("signaling that the server is not ready to accept connections");
        state.ready = false;
    }

    /// Enter the terminal shutting-down state.
    ///
    /// Forces `ready = true`. Orchestrators that key traffic removal off the
    /// readiness transition rather than a shutting-down status rely on it,
    /// together with `/health` and `/live` reporting the shutdown.
    pub(crate) fn freeze(&self) {
        let mut state = self.lock();
        state.ready = true;
        state.shutting_down = true;
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    pub fn snapshot(&self) -> StateSnapshot {
        *self.lock()
    }
}
