//! Shutdown hook implementations.
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use tokio::process::Command;

use crate::{config::models::HookConfig, ports::shutdown_hook::ShutdownHook};

/// Hook wrapping a blocking closure.
///
/// The closure runs on tokio's blocking pool, so it may do synchronous I/O or
/// sleep without stalling the runtime. A panic inside the closure is reported
/// as a hook error.
pub struct FnHook<F> {
    name: String,
    f: Arc<F>,
}

impl<F> FnHook<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Box the hook for registration with a coordinator.
    pub fn boxed(name: impl Into<String>, f: F) -> Box<dyn ShutdownHook> {
        Box::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F> ShutdownHook for FnHook<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        let f = self.f.clone();
        tokio::task::spawn_blocking(move || f())
            .await
            .map_err(|e| eyre!("hook task did not complete: {e}"))?
    }
}

/// Hook running an external command; a non-zero exit status is a failure.
#[derive(Debug, Clone)]
pub struct CommandHook {
    name: String,
    command: String,
    args: Vec<String>,
}

impl CommandHook {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &HookConfig) -> Self {
        Self::new(config.display_name(), &config.command, config.args.clone())
    }
}

#[async_trait]
impl ShutdownHook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        tracing::debug!("Executing hook command: {} {:?}", self.command, self.args);

        let status = Command::new(&self.command)
            .args(&self.args)
            .status()
            .await
            .wrap_err_with(|| format!("Failed to spawn '{}'", self.command))?;

        if !status.success() {
            return Err(eyre!("'{}' exited with {}", self.command, status));
        }
        Ok(())
    }
}

/// Build hooks for every command listed in the configuration, in order.
pub fn command_hooks(configs: &[HookConfig]) -> Vec<Box<dyn ShutdownHook>> {
    configs
        .iter()
        .map(|config| Box::new(CommandHook::from_config(config)) as Box<dyn ShutdownHook>)
        .collect()
}
