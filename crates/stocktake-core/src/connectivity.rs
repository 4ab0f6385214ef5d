//! Connectivity monitor
//!
//! A purely observable online/offline signal. The host platform reports
//! transitions via [`ConnectivityMonitor::set_online`]; consumers read the
//! current state or subscribe to transitions. The monitor performs no I/O
//! and never retries anything itself.

use tokio::sync::watch;

/// Broadcasts online/offline transitions to subscribers
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self { sender }
    }

    /// Current online state
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Report the host's connectivity state. Subscribers are only woken on
    /// actual transitions.
    pub fn set_online(&self, online: bool) {
        self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    /// Subscribe to transitions; dropping the receiver unsubscribes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_current_state() {
        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.is_online());

        monitor.set_online(true);
        assert!(monitor.is_online());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subscriber_sees_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let mut receiver = monitor.subscribe();

        monitor.set_online(true);
        receiver.changed().await.unwrap();
        assert!(*receiver.borrow());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_event_without_transition() {
        let monitor = ConnectivityMonitor::new(true);
        let mut receiver = monitor.subscribe();
        receiver.mark_unchanged();

        // Same state again: no wakeup
        monitor.set_online(true);
        assert!(!receiver.has_changed().unwrap());

        monitor.set_online(false);
        assert!(receiver.has_changed().unwrap());
    }
}
