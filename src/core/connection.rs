//! Live connection accounting.
//!
//! The server reports every connection lifecycle transition as a
//! [`ConnectionEvent`]. Only opens and closes (including take-overs) move the
//! counter; the keep-alive sub-states are accepted and ignored so callers can
//! forward every transition they observe without filtering.
use std::future::Future;

use tokio::sync::watch;

/// A connection lifecycle transition reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// A new connection was accepted.
    Opened,
    /// A kept-alive connection started reading a request.
    Active,
    /// A kept-alive connection finished a request and is waiting for the next.
    Idle,
    /// The connection was closed.
    Closed,
    /// The connection was taken over by another owner (e.g. a protocol upgrade)
    /// and is no longer the server's responsibility.
    TakenOver,
}

/// Counter of live connections that can be awaited until it reaches zero.
///
/// Updates go through a `watch` channel so every increment/decrement is
/// serialized with the zero-check performed by [`LiveConnections::drained`].
#[derive(Debug)]
pub struct LiveConnections {
    tx: watch::Sender<u64>,
}

impl LiveConnections {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Apply `event` and return the resulting count.
    ///
    /// A close reported while the count is already zero is a caller contract
    /// violation; it is logged and the count stays at zero.
    pub fn record(&self, event: ConnectionEvent) -> u64 {
        let mut current = 0;
        let mut underflow = false;

        self.tx.send_if_modified(|live| {
            let changed = match event {
                ConnectionEvent::Opened => {
                    *live += 1;
                    true
                }
                ConnectionEvent::Closed | ConnectionEvent::TakenOver => match live.checked_sub(1) {
                    Some(next) => {
                        *live = next;
                        true
                    }
                    None => {
                        underflow = true;
                        false
                    }
                },
                ConnectionEvent::Active | ConnectionEvent::Idle => false,
            };
            current = *live;
            changed
        });

        if underflow {
            tracing::error!(
                "Connection event {:?} reported with no live connections; ignoring",
                event
            );
        }

        current
    }

    /// Current number of live connections.
    pub fn count(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Future resolving once the count is zero. Resolves immediately if it
    /// already is. Dropping the future before it resolves has no effect on
    /// the counter.
    pub fn drained(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut rx = self.tx.subscribe();
        async move {
            if rx.wait_for(|live| *live == 0).await.is_err() {
                tracing::warn!("Connection counter dropped while waiting for drain");
            }
        }
    }
}

impl Default for LiveConnections {
    fn default() -> Self {
        Self::new()
    }
}
