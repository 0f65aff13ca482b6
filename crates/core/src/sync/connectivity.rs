//! Network reachability state, fed by the platform layer.

use log::info;
use tokio::sync::watch;

/// Tracks online/offline state and exposes transition events.
///
/// The platform layer calls [`set_online`](Self::set_online) whenever
/// reachability changes; the scheduler subscribes to trigger a sync on the
/// offline-to-online edge.
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Update reachability. Observers are only notified on actual
    /// transitions, not on repeated reports of the same state.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(
                "[Sync] Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    /// Receiver that resolves whenever reachability flips.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_transitions_once() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        assert!(monitor.is_online());

        monitor.set_online(true);
        assert!(!rx.has_changed().expect("channel open"));

        monitor.set_online(false);
        assert!(rx.has_changed().expect("channel open"));
        rx.changed().await.expect("channel open");
        assert!(!*rx.borrow());
        assert!(!monitor.is_online());
    }
}
