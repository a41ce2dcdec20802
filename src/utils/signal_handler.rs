//! OS signal handling for graceful shutdown.
//!
//! SIGTERM, SIGQUIT and SIGHUP start a graceful stop through
//! [`ShutdownCoordinator::on_stop`]; SIGINT stops uncleanly without draining
//! or running hooks. The handler only decides the exit code; exiting the
//! process is left to the caller.
use std::sync::Arc;

use eyre::Result;

pub use crate::core::EXIT_FORCED;
use crate::core::ShutdownCoordinator;

/// Exit code after every connection drained.
pub const EXIT_GRACEFUL: i32 = 0;
/// Exit code for an unclean stop on SIGINT.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Signals that end the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
    /// SIGHUP
    Hangup,
    /// SIGINT (Ctrl+C)
    Interrupt,
}

impl ShutdownSignal {
    /// Whether the signal asks for connections to drain before exiting.
    pub fn is_graceful(self) -> bool {
        !matches!(self, Self::Interrupt)
    }
}

/// Wait for the next shutdown signal.
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<ShutdownSignal> {
    use eyre::WrapErr;
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    let mut sigquit = signal(SignalKind::quit()).wrap_err("Failed to register SIGQUIT handler")?;
    let mut sighup =
        signal(SignalKind::hangup()).wrap_err("Failed to register SIGHUP handler")?;

    let received = tokio::select! {
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sigquit.recv() => ShutdownSignal::Quit,
        _ = sighup.recv() => ShutdownSignal::Hangup,
        result = tokio::signal::ctrl_c() => {
            result.wrap_err("Failed to listen for Ctrl+C")?;
            ShutdownSignal::Interrupt
        }
    };
    Ok(received)
}

/// Wait for the next shutdown signal.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> Result<ShutdownSignal> {
    use eyre::WrapErr;

    // Ctrl+C is the only portable signal, so it has to mean a graceful stop.
    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for Ctrl+C")?;
    Ok(ShutdownSignal::Terminate)
}

/// Act on a received signal and return the exit code the process should use.
pub async fn handle_signal(coordinator: &ShutdownCoordinator, signal: ShutdownSignal) -> i32 {
    if !signal.is_graceful() {
        tracing::error!(
            "Caught {:?}, stopping without draining {} connection(s)",
            signal,
            coordinator.live_connections()
        );
        return EXIT_INTERRUPTED;
    }

    tracing::info!("Caught {:?}, initiating graceful shutdown", signal);
    match coordinator.on_stop().await {
        Ok(()) => {
            tracing::info!("Server has shut down gracefully");
            EXIT_GRACEFUL
        }
        Err(e) => {
            tracing::error!("Server failed to shut down gracefully: {}", e);
            e.exit_code()
        }
    }
}

/// Wait for a shutdown signal, stop the coordinator and return the exit code.
pub async fn run_signal_handler(coordinator: Arc<ShutdownCoordinator>) -> Result<i32> {
    tracing::info!(
        "Signal handler started. Listening for SIGTERM, SIGQUIT, SIGHUP (graceful) and SIGINT (immediate)"
    );

    let signal = wait_for_signal().await?;
    Ok(handle_signal(&coordinator, signal).await)
}
