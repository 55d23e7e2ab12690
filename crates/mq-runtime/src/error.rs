//! Error types for queue operations.

use thiserror::Error;

/// Error type for publish and consume operations across all drivers
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("exchange '{exchange}' declaration failed: {message}")]
    ExchangeDeclaration { exchange: String, message: String },

    #[error("queue '{queue}' declaration failed: {message}")]
    QueueDeclaration { queue: String, message: String },

    #[error("publish to '{exchange}' with route key '{route_key}' rejected: {message}")]
    Publish {
        exchange: String,
        route_key: String,
        message: String,
    },

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl QueueError {
    /// Check if the error means the process cannot usefully continue.
    ///
    /// Connection and configuration failures are fatal at startup; the
    /// remaining variants fail one publish or consume attempt.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Configuration(_) => true,
            Self::ExchangeDeclaration { .. } => false,
            Self::QueueDeclaration { .. } => false,
            Self::Publish { .. } => false,
            Self::Transport { .. } => false,
            Self::Validation(_) => false,
        }
    }

    /// Shorthand for a connection failure carrying a source error message
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Shorthand for a transport failure carrying a source error message
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Validation errors for names and other caller-supplied values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field missing: {field}")]
    Required { field: String },

    #[error("invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid configuration: {message}")]
    Invalid { message: String },

    #[error("missing required configuration: {key}")]
    Missing { key: String },

    #[error("unsupported driver: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("configuration parsing failed: {message}")]
    Parsing { message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
