//! Error types for tlsgate

use thiserror::Error;

/// Main error type for tlsgate
#[derive(Error, Debug)]
pub enum Error {
    /// Policy or service configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A phase event arrived that the connection state cannot accept
    #[error("Sequence error: {0}")]
    Sequence(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for tlsgate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Validation(_) => 400,
            Error::Sequence(_) => 500,
            Error::Tls(_) => 500,
            Error::Webhook(_) => 500,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Sequence(_) => "SEQUENCE_ERROR",
            Error::Tls(_) => "TLS_ERROR",
            Error::Webhook(_) => "WEBHOOK_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
