use std::sync::Arc;

use crate::core::{ConnectionEvent, ShutdownCoordinator};

/// Reports a connection's lifetime to the coordinator.
///
/// Creating the guard reports [`ConnectionEvent::Opened`]; dropping it reports
/// [`ConnectionEvent::Closed`], so every open is paired with exactly one close
/// even when the connection task errors out or is cancelled.
#[derive(Debug)]
pub struct ConnectionGuard {
    coordinator: Arc<ShutdownCoordinator>,
    armed: bool,
}

impl ConnectionGuard {
    pub fn open(coordinator: Arc<ShutdownCoordinator>) -> Self {
        coordinator.record_connection_event(ConnectionEvent::Opened);
        Self {
            coordinator,
            armed: true,
        }
    }

    /// Hand the connection over to another owner. Reports
    /// [`ConnectionEvent::TakenOver`] instead of a close.
    pub fn take_over(mut self) {
        self.armed = false;
        self.coordinator
            .record_connection_event(ConnectionEvent::TakenOver);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator
                .record_connection_event(ConnectionEvent::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> Arc<ShutdownCoordinator> {
        Arc::new(ShutdownCoordinator::new(1000, Vec::new()).unwrap())
    }

    #[test]
    fn test_guard_pairs_open_with_close() {
        let coordinator = coordinator();
        let first = ConnectionGuard::open(coordinator.clone());
        let second = ConnectionGuard::open(coordinator.clone());
        assert_eq!(coordinator.live_connections(), 2);

        drop(first);
        assert_eq!(coordinator.live_connections(), 1);
        drop(second);
        assert_eq!(coordinator.live_connections(), 0);
    }

    #[test]
    fn test_take_over_counts_once() {
        let coordinator = coordinator();
        let guard = ConnectionGuard::open(coordinator.clone());

        guard.take_over();
        assert_eq!(coordinator.live_connections(), 0);

        // A later open must not be masked by a stray close from the taken-over guard.
        let _guard = ConnectionGuard::open(coordinator.clone());
        assert_eq!(coordinator.live_connections(), 1);
    }
}
