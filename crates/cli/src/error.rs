//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] contracts::ContractError),

    /// Server failed to start or stopped with an error
    #[error("Server error: {0}")]
    Server(#[from] server::ServerError),

    /// Logging or metrics exporter could not be initialized
    #[error("Failed to initialize observability: {0}")]
    Observability(String),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
