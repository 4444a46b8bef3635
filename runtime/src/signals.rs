//! Platform signals: connectivity and app lifecycle.
//!
//! The host platform publishes into a [`SignalHub`]; the sync service
//! subscribes and turns edges (offline to online, app foregrounded) into
//! scheduler triggers. Subscriptions are owned by a [`SignalBinding`]
//! whose drop tears the listener task down, so a discarded service stops
//! reacting to signals instead of leaking a task.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// App lifecycle transitions the platform reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foregrounded,
    Backgrounded,
}

/// Fan-out point for platform signals.
#[derive(Debug)]
pub struct SignalHub {
    connectivity: watch::Sender<bool>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl SignalHub {
    /// Create a hub with the given initial connectivity.
    pub fn new(initially_connected: bool) -> Self {
        let (connectivity, _) = watch::channel(initially_connected);
        let (lifecycle, _) = broadcast::channel(16);
        Self {
            connectivity,
            lifecycle,
        }
    }

    /// Current connectivity as last reported by the platform.
    pub fn is_connected(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Report a connectivity change. Idempotent; repeated reports of the
    /// same state still wake watchers, which debounce on the edge.
    pub fn set_connected(&self, connected: bool) {
        self.connectivity.send_replace(connected);
    }

    /// Report a lifecycle transition.
    pub fn publish(&self, event: LifecycleEvent) {
        // No subscribers is fine; the event is simply dropped.
        let _ = self.lifecycle.send(event);
    }

    /// Subscribe to connectivity updates.
    pub fn watch_connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Handle owning a signal listener task. Dropping it stops the listener.
#[derive(Debug)]
pub struct SignalBinding {
    task: JoinHandle<()>,
}

impl SignalBinding {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for SignalBinding {
    fn drop(&mut self) {
        self.task.abort();
    }
}
