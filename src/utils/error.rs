use std::time::Duration;

use thiserror::Error;

/// Custom error types for the request admission service
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration values that parse but make no sense
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Redis related errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Counter store did not answer within the command timeout
    #[error("Counter store timed out after {0:?}")]
    StoreTimeout(Duration),

    /// No counter store is configured or it could not be reached
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for request admission operations
pub type AdmissionResult<T> = Result<T, AdmissionError>;

impl From<std::io::Error> for AdmissionError {
    fn from(err: std::io::Error) -> Self {
        AdmissionError::Internal(err.to_string())
    }
}
