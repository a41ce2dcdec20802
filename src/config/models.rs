//! Configuration data structures for quiesce.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They
//! are serde-friendly and carry defaults so a minimal config stays short.
use serde::{Deserialize, Serialize};

/// Top-level configuration of the demo server binary.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server listens on
    pub listen_addr: String,
    /// Artificial delay before the demo handler answers, in milliseconds
    pub response_delay_ms: u64,
    /// Graceful shutdown settings
    pub shutdown: ShutdownConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            response_delay_ms: 0,
            shutdown: ShutdownConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Graceful shutdown settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Grace period for draining connections, in milliseconds. Signed so that
    /// a negative value in a config file is reported rather than failing to parse.
    pub timeout_ms: i64,
    /// External commands run as shutdown hooks, in order
    pub hooks: Vec<HookConfig>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            hooks: Vec::new(),
        }
    }
}

/// A shutdown hook that runs an external command.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HookConfig {
    /// Name used in log lines (defaults to the command)
    #[serde(default)]
    pub name: Option<String>,
    /// Program to execute
    pub command: String,
    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
}

impl HookConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }
}

/// Log output settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "quiesce=debug"
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}
