use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::config::models::{HookConfig, LoggingConfig, ServerConfig, ShutdownConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(mut shutdown_errors) = Self::validate_shutdown_config(&config.shutdown) {
            errors.append(&mut shutdown_errors);
        }

        if let Err(e) = Self::validate_logging_config(&config.logging) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate the grace period and every hook command
    fn validate_shutdown_config(config: &ShutdownConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.timeout_ms < 0 {
            errors.push(ValidationError::InvalidField {
                field: "shutdown.timeout_ms".to_string(),
                message: format!(
                    "Grace period must not be negative, got {}",
                    config.timeout_ms
                ),
            });
        }

        for (i, hook) in config.hooks.iter().enumerate() {
            if let Err(e) = Self::validate_hook(i, hook) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_hook(index: usize, hook: &HookConfig) -> ValidationResult<()> {
        if hook.command.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: format!("shutdown.hooks[{index}].command"),
            });
        }
        Ok(())
    }

    fn validate_logging_config(config: &LoggingConfig) -> ValidationResult<()> {
        EnvFilter::try_new(&config.level)
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: format!("'{}' is not a valid log filter: {e}", config.level),
            })
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
