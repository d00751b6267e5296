//! Transport Error Types
//!
//! Error taxonomy for the TCP line transport. Connection failures are
//! retried by the caller with backoff; I/O failures end only the connection
//! they happened on; protocol failures drop one line; configuration failures
//! are fatal before any loop starts.

use fleet_codec::CodecError;
use fleet_config::ConfigError;
use fleet_types::HistoryError;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Read/write failure on an established connection
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Could not establish a connection
    #[error("Connection error: {message} (remote: {remote})")]
    Connection {
        message: String,
        remote: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Envelope encode/decode failure
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    /// Operation on a client or server that has been closed for good
    #[error("Transport closed: {message}")]
    Closed { message: String },

    /// Cooperative cancellation interrupted the operation
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            remote: remote.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote: remote.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Closed { .. } => false,
            TransportError::Cancelled { .. } => false,
        }
    }

    /// True for failures to establish a connection (including timeouts)
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. } | TransportError::Timeout { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Connection { .. } => "connection",
            TransportError::Protocol { .. } => "protocol",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io { .. } => "io",
            TransportError::Closed { .. } => "closed",
            TransportError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<CodecError> for TransportError {
    fn from(error: CodecError) -> Self {
        TransportError::protocol_with_source(error.to_string(), error)
    }
}

impl From<ConfigError> for TransportError {
    fn from(error: ConfigError) -> Self {
        let field = error.field().map(str::to_string);
        TransportError::Configuration {
            message: error.to_string(),
            field,
        }
    }
}

impl From<HistoryError> for TransportError {
    fn from(error: HistoryError) -> Self {
        TransportError::configuration(error.to_string(), Some("wire.history_size"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = TransportError::network("Connection reset");
        assert_eq!(err.category(), "network");
        assert!(err.is_retryable());
        assert!(!err.is_connect_error());
    }

    #[test]
    fn test_connection_error() {
        let err = TransportError::connection("Refused", "127.0.0.1:9000");
        match &err {
            TransportError::Connection { remote, .. } => assert_eq!(remote, "127.0.0.1:9000"),
            _ => panic!("Expected Connection error"),
        }
        assert!(err.is_connect_error());
        assert!(TransportError::timeout("connect", 5000).is_connect_error());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TransportError::timeout("connect", 1000).is_retryable());
        assert!(!TransportError::configuration("bad", None).is_retryable());
        assert!(!TransportError::closed("disposed").is_retryable());
        assert!(!TransportError::cancelled("connect").is_retryable());
        assert!(!TransportError::protocol("bad line").is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let transport_err = TransportError::from(io_err);

        match transport_err {
            TransportError::Io { message, .. } => {
                assert!(message.contains("test"));
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_config_error_keeps_field() {
        let err: TransportError = ConfigError::invalid("wire.host", "must not be empty").into();
        match err {
            TransportError::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("wire.host"));
            }
            _ => panic!("Expected Configuration error"),
        }
    }
}
