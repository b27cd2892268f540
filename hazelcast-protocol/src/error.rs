//! Error types for Hazelcast client transport operations.

use std::io;
use thiserror::Error;

/// The main error type for Hazelcast client transport operations.
#[derive(Debug, Error)]
pub enum HazelcastError {
    /// Connection-related errors (network failures, disconnections).
    #[error("connection error: {0}")]
    Connection(String),

    /// Framing errors (cursor overrun, malformed header).
    ///
    /// These are fatal to the connection the frame arrived on.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Payload decoding errors (invalid UTF-8, unexpected response type).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The invocation deadline elapsed before a response arrived.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// The caller cancelled the invocation.
    #[error("invocation cancelled: {0}")]
    Cancelled(String),

    /// A precondition on the arguments of an operation was violated.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The partition owner is not known yet.
    #[error("unknown partition: {0}")]
    UnknownPartition(i32),

    /// An error reported by the cluster in an exception response.
    #[error("server error {code} ({class_name}): {}", message.as_deref().unwrap_or("<no message>"))]
    Server {
        /// Server-assigned error code.
        code: i32,
        /// Class name of the server-side exception.
        class_name: String,
        /// Optional error message.
        message: Option<String>,
        /// Whether the failure is transient and the operation may be re-sent.
        retryable: bool,
    },

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HazelcastError {
    /// Returns `true` if the failure is transient.
    ///
    /// A transient failure may be retried for operations that are classified
    /// as retryable; for every other operation it is surfaced as is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::UnknownPartition(_) => true,
            Self::Server { retryable, .. } => *retryable,
            Self::Io(_) => true,
            _ => false,
        }
    }
}

/// A specialized `Result` type for Hazelcast operations.
pub type Result<T> = std::result::Result<T, HazelcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = HazelcastError::Connection("failed to connect to server".to_string());
        assert_eq!(
            err.to_string(),
            "connection error: failed to connect to server"
        );
    }

    #[test]
    fn test_protocol_error_display() {
        let err = HazelcastError::Protocol("read past frame end".to_string());
        assert_eq!(err.to_string(), "protocol error: read past frame end");
    }

    #[test]
    fn test_timeout_error_display() {
        let err = HazelcastError::Timeout("invocation timed out after 120s".to_string());
        assert_eq!(
            err.to_string(),
            "timeout error: invocation timed out after 120s"
        );
    }

    #[test]
    fn test_illegal_argument_display() {
        let err = HazelcastError::IllegalArgument("permits cannot be negative".to_string());
        assert_eq!(
            err.to_string(),
            "illegal argument: permits cannot be negative"
        );
    }

    #[test]
    fn test_server_error_display() {
        let err = HazelcastError::Server {
            code: 21,
            class_name: "HazelcastInstanceNotActiveException".to_string(),
            message: Some("not active".to_string()),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "server error 21 (HazelcastInstanceNotActiveException): not active"
        );

        let err = HazelcastError::Server {
            code: 25,
            class_name: "IllegalArgumentException".to_string(),
            message: None,
            retryable: false,
        };
        assert!(err.to_string().ends_with("<no message>"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(HazelcastError::Connection("closed".into()).is_retryable());
        assert!(HazelcastError::UnknownPartition(7).is_retryable());
        assert!(!HazelcastError::Protocol("overrun".into()).is_retryable());
        assert!(!HazelcastError::Timeout("late".into()).is_retryable());
        assert!(!HazelcastError::Cancelled("dropped".into()).is_retryable());
        assert!(!HazelcastError::IllegalArgument("negative".into()).is_retryable());

        let transient = HazelcastError::Server {
            code: 1,
            class_name: "X".into(),
            message: None,
            retryable: true,
        };
        assert!(transient.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err: HazelcastError = io_err.into();
        assert!(matches!(err, HazelcastError::Io(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HazelcastError>();
    }
}
