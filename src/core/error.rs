use std::time::Duration;

use thiserror::Error;

/// Exit code for a stop that did not drain cleanly.
pub const EXIT_FORCED: i32 = 1;

/// Errors produced by the shutdown coordinator.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ShutdownError {
    /// The coordinator could not be constructed from the supplied settings.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The grace period elapsed with connections still open. Hooks still ran.
    #[error("Shutdown timed out after {timeout:?} with {remaining} connection(s) still open")]
    TimedOut { timeout: Duration, remaining: u64 },

    /// `on_stop` was called after a shutdown had already begun.
    #[error("Shutdown already initiated")]
    AlreadyInitiated,

    /// The shutdown task ended without reporting an outcome, for example
    /// because the runtime shut down underneath it.
    #[error("Shutdown task aborted: {reason}")]
    Aborted { reason: String },

    /// A single hook failed. Only ever logged, never returned from `on_stop`.
    #[error("Shutdown hook '{hook}' failed: {reason}")]
    HookFailed { hook: String, reason: String },
}

impl ShutdownError {
    /// Process exit status the caller should use for this error.
    pub fn exit_code(&self) -> i32 {
        EXIT_FORCED
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
