//! Error types for the Turnstile crate.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// The sliding window must be longer than zero
    #[error("Invalid window: window size must be greater than zero")]
    InvalidWindow,

    /// The per-window quota must admit at least one request
    #[error("Invalid quota: max_requests must be greater than zero")]
    InvalidMaxRequests,

    /// The reclaimer period must be longer than zero
    #[error("Invalid cleanup interval: interval must be greater than zero")]
    InvalidCleanupInterval,

    /// No async runtime is available to host the reclaimer task
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for TurnstileError {
    fn from(err: ::config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_parameter() {
        assert!(TurnstileError::InvalidWindow.to_string().contains("window"));
        assert!(TurnstileError::InvalidMaxRequests
            .to_string()
            .contains("max_requests"));
        assert!(TurnstileError::InvalidCleanupInterval
            .to_string()
            .contains("cleanup interval"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.yaml");
        let err: TurnstileError = io.into();
        assert!(matches!(err, TurnstileError::Io(_)));
        assert!(err.to_string().contains("missing.yaml"));
    }
}
