//! Logging errors

use thiserror::Error;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Result alias for logging setup
pub type LogResult<T> = Result<T, LogError>;
