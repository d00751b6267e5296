//! Codec-level errors for envelope construction and decoding
//!
//! Every variant describes a single message: the bus drops that message and
//! keeps going. None of these errors tear down a connection or a subscriber.

use thiserror::Error;

/// Envelope encode/decode errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be represented as JSON
    #[error("Encode error: {type_name} cannot be represented as JSON: {source}")]
    Encode {
        type_name: String,
        source: serde_json::Error,
    },

    /// Line is not a well-formed envelope
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        source: Option<serde_json::Error>,
    },

    /// Envelope carries no payload (absent or JSON null)
    #[error("Decode error: envelope on topic '{topic}' has no payload")]
    MissingPayload { topic: String },

    /// Payload JSON shape does not convert to the requested type
    #[error("Type mismatch: payload '{payload_type}' cannot be decoded as {expected}: {source}")]
    TypeMismatch {
        payload_type: String,
        expected: String,
        source: serde_json::Error,
    },

    /// Topic is empty or whitespace
    #[error("Invalid topic: {reason}")]
    InvalidTopic { reason: String },
}

impl CodecError {
    /// Create a decode error without an underlying JSON error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            source: None,
        }
    }

    /// Create a decode error from a JSON parse failure
    pub fn decode_with_source(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            message: message.into(),
            source: Some(source),
        }
    }

    /// True for failures reading a payload or line, as opposed to encoding one
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::MissingPayload { .. } | Self::TypeMismatch { .. }
        )
    }
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
