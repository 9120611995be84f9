//! Process-level error handling for the gateway services
//!
//! Library crates keep their own error enums; everything that reaches
//! `main` is converted into [`GatewayError`].

use thiserror::Error;

/// Errors surfaced while bootstrapping or running a service
#[derive(Debug, Error)]
pub enum GatewayError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using GatewayError
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Configuration problems exit with 2, everything else with 1
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}
