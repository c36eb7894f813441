//! Network-status gate
//!
//! A single process-wide connectivity boolean fed by the platform
//! connectivity listener and consulted before every mutation to decide
//! between "send now" and "enqueue for later".

use tokio::sync::watch;

/// Current connectivity, with change notification for reconnect handling.
///
/// Single writer (the connectivity listener), many readers. No hysteresis:
/// a flapping connection routes mutations inconsistently, which the product
/// accepts today.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    online: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// Create a monitor with the given initial connectivity.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { online: sender }
    }

    /// Record a connectivity change reported by the platform listener.
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            tracing::debug!(online, "connectivity changed");
        }
    }

    /// Last connectivity value reported by the platform listener.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        !*self.online.borrow()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Subscribe to connectivity changes (used for reconnect-triggered drains).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

impl Default for NetworkMonitor {
    /// Assume online until the listener reports otherwise.
    fn default() -> Self {
        Self::new(true)
    }
}
