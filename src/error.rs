//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Only configuration and I/O surface errors; an admission decision is
/// always produced once the limiter is running.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Invalid policy values or malformed configuration documents
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures from the layered configuration loader
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
