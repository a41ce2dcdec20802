//! Graceful shutdown coordination.
//!
//! [`ShutdownCoordinator`] tracks the server's live connections, exposes an
//! advisory accept flag, and on shutdown races a wait for the connections to
//! drain against the configured grace period. Either way the registered hooks
//! run exactly once, after the race has resolved.
use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use futures_util::FutureExt;
use tokio::time::{Instant, sleep};

use crate::{
    config::models::ShutdownConfig,
    core::{
        connection::{ConnectionEvent, LiveConnections},
        error::ShutdownError,
    },
    ports::shutdown_hook::ShutdownHook,
};

/// Lifecycle of a coordinator: `Idle -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinatorState {
    Idle = 0,
    Draining = 1,
    Stopped = 2,
}

impl CoordinatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Which side of the drain-or-timeout race finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownOutcome {
    Drained,
    TimedOut,
}

/// Coordinates connection draining and cleanup hooks for one server instance.
pub struct ShutdownCoordinator {
    shared: Arc<Shared>,
}

/// State shared between the coordinator and its shutdown task.
struct Shared {
    timeout: Duration,
    connections: LiveConnections,
    accepting: RwLock<bool>,
    state: AtomicU8,
    hooks: Vec<Box<dyn ShutdownHook>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a grace period in milliseconds.
    ///
    /// Fails with [`ShutdownError::InvalidConfiguration`] if `timeout_ms` is
    /// negative.
    pub fn new(timeout_ms: i64, hooks: Vec<Box<dyn ShutdownHook>>) -> Result<Self, ShutdownError> {
        let timeout_ms = u64::try_from(timeout_ms).map_err(|_| ShutdownError::InvalidConfiguration {
            message: format!("shutdown timeout must not be negative, got {timeout_ms}ms"),
        })?;
        Ok(Self::with_timeout(Duration::from_millis(timeout_ms), hooks))
    }

    /// Create a coordinator with an already validated grace period.
    pub fn with_timeout(timeout: Duration, hooks: Vec<Box<dyn ShutdownHook>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                timeout,
                connections: LiveConnections::new(),
                accepting: RwLock::new(false),
                state: AtomicU8::new(CoordinatorState::Idle as u8),
                hooks,
            }),
        }
    }

    /// Create a coordinator from the `shutdown` section of the configuration.
    pub fn from_config(
        config: &ShutdownConfig,
        hooks: Vec<Box<dyn ShutdownHook>>,
    ) -> Result<Self, ShutdownError> {
        Self::new(config.timeout_ms, hooks)
    }

    /// Grace period allowed for draining.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Number of registered shutdown hooks.
    pub fn hook_count(&self) -> usize {
        self.shared.hooks.len()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CoordinatorState {
        self.shared.state()
    }

    /// Number of connections opened and not yet closed or taken over.
    pub fn live_connections(&self) -> u64 {
        self.shared.connections.count()
    }

    /// Record a connection lifecycle transition reported by the server.
    pub fn record_connection_event(&self, event: ConnectionEvent) {
        let live = self.shared.connections.record(event);
        tracing::debug!("Connection event: {:?}, live_connections={}", event, live);
    }

    /// Set the advisory accept flag.
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.set_accepting(accepting);
    }

    /// Whether new connections should currently be admitted.
    pub fn is_accepting(&self) -> bool {
        *self
            .shared
            .accepting
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every registered hook once, in registration order.
    ///
    /// A hook that fails or panics is logged and the next hook still runs.
    pub async fn run_hooks(&self) {
        self.shared.run_hooks().await;
    }

    /// Stop the server gracefully.
    ///
    /// Clears the accept flag, then waits for the live connections to drain,
    /// bounded by the grace period. Hooks run once the race resolves, whatever
    /// its outcome. Returns `Ok(())` if the connections drained and
    /// [`ShutdownError::TimedOut`] otherwise.
    ///
    /// The race and the hooks run on their own task: dropping the returned
    /// future stops waiting for the result, not the shutdown itself.
    ///
    /// Only the first call performs a shutdown; later calls return
    /// [`ShutdownError::AlreadyInitiated`] without running hooks.
    pub async fn on_stop(&self) -> Result<(), ShutdownError> {
        if self
            .shared
            .state
            .compare_exchange(
                CoordinatorState::Idle as u8,
                CoordinatorState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::warn!("Shutdown already initiated, ignoring stop request");
            return Err(ShutdownError::AlreadyInitiated);
        }

        self.set_accepting(false);
        tracing::info!(
            "Shutdown requested: draining {} live connection(s), grace period {}",
            self.live_connections(),
            humantime::format_duration(self.timeout())
        );

        let shutdown = tokio::spawn(Arc::clone(&self.shared).drain_then_run_hooks());
        match shutdown.await {
            Ok(result) => result,
            Err(e) => {
                self.shared.mark_stopped();
                tracing::error!("Shutdown task did not complete: {}", e);
                Err(ShutdownError::Aborted {
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl Shared {
    fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn mark_stopped(&self) {
        self.state
            .store(CoordinatorState::Stopped as u8, Ordering::Release);
    }

    fn set_accepting(&self, accepting: bool) {
        *self
            .accepting
            .write()
            .unwrap_or_else(PoisonError::into_inner) = accepting;
    }

    async fn drain_then_run_hooks(self: Arc<Self>) -> Result<(), ShutdownError> {
        let started = Instant::now();
        let outcome = self.race_drain().await;
        let remaining = self.connections.count();

        match outcome {
            ShutdownOutcome::Drained => tracing::info!(
                "Connections drained after {:?}, graceful exit possible; running shutdown hooks",
                started.elapsed()
            ),
            ShutdownOutcome::TimedOut => tracing::warn!(
                "Shutdown timed out with {} connection(s) still open; running shutdown hooks",
                remaining
            ),
        }

        self.run_hooks().await;
        self.mark_stopped();

        match outcome {
            ShutdownOutcome::Drained => Ok(()),
            ShutdownOutcome::TimedOut => Err(ShutdownError::TimedOut {
                timeout: self.timeout,
                remaining,
            }),
        }
    }

    async fn race_drain(&self) -> ShutdownOutcome {
        tokio::select! {
            // A coordinator with nothing to drain must win even with a zero timeout.
            biased;
            _ = self.connections.drained() => ShutdownOutcome::Drained,
            _ = sleep(self.timeout) => ShutdownOutcome::TimedOut,
        }
    }

    async fn run_hooks(&self) {
        for (index, hook) in self.hooks.iter().enumerate() {
            let name = hook.name();
            tracing::info!("Running shutdown hook {} ({}/{})", name, index + 1, self.hooks.len());

            let failure = match AssertUnwindSafe(hook.run()).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(_) => Some("hook panicked".to_string()),
            };

            if let Some(reason) = failure {
                let err = ShutdownError::HookFailed {
                    hook: name.to_string(),
                    reason,
                };
                tracing::error!("{}", err);
            }
        }
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("timeout", &self.timeout())
            .field("live_connections", &self.live_connections())
            .field("accepting", &self.is_accepting())
            .field("state", &self.state())
            .field("hooks", &self.hook_count())
            .finish()
    }
}
