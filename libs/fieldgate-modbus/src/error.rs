//! Link Error Types
//!
//! Error types shared by the Modbus codec, decoder and transport.

use thiserror::Error;

/// Result type for fieldgate-modbus operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Field link errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    /// Malformed or unexpected frame content
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Response answers a different request; the link is out of step
    #[error("Transaction ID mismatch: expected {expected:04X}, got {got:04X}")]
    TransactionMismatch { expected: u16, got: u16 },

    /// Device answered with an exception response
    #[error("Exception response: FC{function:02X} code {code:#04X}")]
    Exception { function: u8, code: u8 },

    /// Connect-phase failure (refused, unreachable, connect timeout)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Read/write failure on an established connection
    #[error("IO error: {0}")]
    Io(String),

    /// No response within the configured timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid register or device description
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource temporarily unavailable
    #[error("Busy: {0}")]
    Busy(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

impl LinkError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        LinkError::Protocol(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        LinkError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        LinkError::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        LinkError::Timeout(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        LinkError::Config(msg.into())
    }

    /// The endpoint could not be reached at all, so further requests to the
    /// same device in this tick would fail the same way.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, LinkError::Connection(_))
    }

    /// The failure was observed on the transport itself; a pooled connection
    /// that produced it must not be reused.
    pub fn poisons_connection(&self) -> bool {
        matches!(
            self,
            LinkError::Io(_)
                | LinkError::Timeout(_)
                | LinkError::Connection(_)
                | LinkError::TransactionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_classification() {
        assert!(LinkError::connection("refused").is_unreachable());
        assert!(!LinkError::timeout("read").is_unreachable());
        assert!(!LinkError::Exception {
            function: 3,
            code: 2
        }
        .is_unreachable());
    }

    #[test]
    fn test_poisons_connection() {
        assert!(LinkError::io("reset").poisons_connection());
        assert!(LinkError::timeout("read").poisons_connection());
        assert!(!LinkError::protocol("byte count").poisons_connection());
        assert!(LinkError::TransactionMismatch {
            expected: 1,
            got: 2
        }
        .poisons_connection());
        assert!(!LinkError::Exception {
            function: 4,
            code: 1
        }
        .poisons_connection());
    }

    #[test]
    fn test_exception_display() {
        let err = LinkError::Exception {
            function: 3,
            code: 2,
        };
        assert_eq!(err.to_string(), "Exception response: FC03 code 0x02");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(LinkError::from(io), LinkError::Io(_)));
    }
}
