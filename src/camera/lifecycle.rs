//! Host lifecycle that capture sessions are bound to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

static NEXT_LIFECYCLE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of the host screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Started,
    Stopped,
}

/// Start/stop signal source for a host.
///
/// Clones share the same state. Sessions may only be bound while the
/// lifecycle is [`LifecycleState::Started`].
#[derive(Debug, Clone)]
pub struct Lifecycle {
    id: u64,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Created);
        Self {
            id: NEXT_LIFECYCLE_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(tx),
        }
    }

    /// Identifier used by providers to group the sessions they bound.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn start(&self) {
        self.state.send_replace(LifecycleState::Started);
    }

    pub fn stop(&self) {
        self.state.send_replace(LifecycleState::Stopped);
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Started
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
