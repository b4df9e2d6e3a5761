//! Server lifecycle state machine.
//!
//! # States
//! ```text
//! Starting → Serving → Draining → Stopped
//! ```
//!
//! Transitions only move forward. `Starting → Stopped` happens when the
//! server fails before it begins accepting connections.

use std::sync::Arc;

use tokio::sync::watch;

/// Coarse lifecycle state of the gRPC server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Services are being registered; not yet accepting.
    Starting,
    /// Accepting connections and dispatching calls.
    Serving,
    /// No longer accepting; waiting for in-flight calls.
    Draining,
    /// Serve loop has returned.
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared handle to the lifecycle state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Starting);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move to `next` if it is ahead of the current state.
    ///
    /// Returns whether the state changed.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(state = %next, "Lifecycle transition");
        }
        changed
    }

    /// Wait until the state reaches at least `target`.
    pub async fn reached(&self, target: LifecycleState) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|state| *state >= target).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
