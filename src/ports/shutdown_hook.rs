use async_trait::async_trait;
use eyre::Result;

/// A cleanup action run once when the server shuts down.
///
/// Hooks run one after another, in the order they were registered, after the
/// connection drain has either completed or timed out. A hook may block for as
/// long as it needs, but every second it takes delays the process exit, so
/// implementations should bound their own work.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    /// Name used in log lines about this hook.
    fn name(&self) -> &str;

    /// Run the cleanup action.
    ///
    /// # Returns
    /// An error if the action failed. The failure is logged by the coordinator
    /// and never prevents the remaining hooks from running.
    async fn run(&self) -> Result<()>;
}
