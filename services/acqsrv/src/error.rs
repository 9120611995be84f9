//! Error handling for the acquisition service

use errors::GatewayError;
use thiserror::Error;

/// Acquisition service error type
#[derive(Error, Debug, Clone)]
pub enum AcqError {
    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Delivery queue errors
    #[error("Sink error: {0}")]
    Sink(String),
}

/// Result type alias for the acquisition service
pub type Result<T> = std::result::Result<T, AcqError>;

impl AcqError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }
}

impl From<figment::Error> for AcqError {
    fn from(err: figment::Error) -> Self {
        Self::Config(format!("Failed to parse config: {err}"))
    }
}

impl From<AcqError> for GatewayError {
    fn from(err: AcqError) -> Self {
        match err {
            AcqError::Config(msg) => GatewayError::Configuration(msg),
            other => GatewayError::Runtime(other.to_string()),
        }
    }
}
