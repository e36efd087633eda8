//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::ShutdownError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Neither --url nor a config file was given
    #[error("no destination: pass --url or --config")]
    MissingUrl,

    /// Configuration loading or validation error
    #[error("Invalid configuration: {0}")]
    Config(#[from] ContractError),

    /// Graceful shutdown error
    #[error("Error during shutdown: {0}")]
    Shutdown(#[from] ShutdownError),
}
