//! Envelope - the unit of data on the bus
//!
//! An envelope is constructed in one of two ways:
//! - [`Envelope::from_value`]: serialize a typed value, record its type name,
//!   stamp the current UTC time
//! - [`Envelope::from_raw`]: wrap JSON that is already encoded, byte for byte,
//!   with an explicit type string (relay paths that must not re-encode)
//!
//! The payload is stored as raw JSON text. `payload_type` is advisory
//! metadata and is never validated against the payload shape.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{CodecError, Result};
use crate::framing::strip_terminator;

/// Topic-tagged, typed, timestamped message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Logical channel, never empty
    pub topic: String,

    /// Advisory type name of the payload
    #[serde(default, alias = "type")]
    pub payload_type: String,

    /// Payload JSON exactly as produced; `None` when absent
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,

    /// When the envelope was stamped
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Build an envelope from a typed value.
    ///
    /// `payload_type` is the unqualified Rust type name of `T`.
    pub fn from_value<T: Serialize + ?Sized>(topic: impl Into<String>, value: &T) -> Result<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        let payload = serde_json::value::to_raw_value(value).map_err(|source| {
            CodecError::Encode {
                type_name: short_type_name::<T>(),
                source,
            }
        })?;
        Ok(Self {
            topic,
            payload_type: short_type_name::<T>(),
            payload: Some(payload),
            timestamp: Utc::now(),
        })
    }

    /// Wrap pre-encoded JSON without re-serializing it.
    ///
    /// `raw_json` must be syntactically valid JSON; an empty string means
    /// "no payload".
    pub fn from_raw(
        topic: impl Into<String>,
        payload_type: impl Into<String>,
        raw_json: impl Into<String>,
    ) -> Result<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        let raw_json = raw_json.into();
        let payload = if raw_json.trim().is_empty() {
            None
        } else {
            Some(RawValue::from_string(raw_json).map_err(|source| {
                CodecError::decode_with_source("raw payload is not valid JSON", source)
            })?)
        };
        Ok(Self {
            topic,
            payload_type: payload_type.into(),
            payload,
            timestamp: Utc::now(),
        })
    }

    /// Payload JSON text, or `None` if absent or JSON `null`.
    pub fn payload_raw(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .map(RawValue::get)
            .filter(|raw| raw.trim() != "null")
    }

    /// True if the envelope carries a non-null payload
    pub fn has_payload(&self) -> bool {
        self.payload_raw().is_some()
    }

    /// Decode the payload on demand.
    ///
    /// Fails with [`CodecError::MissingPayload`] for absent/null payloads and
    /// [`CodecError::TypeMismatch`] when the JSON shape does not fit `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self.payload_raw().ok_or_else(|| CodecError::MissingPayload {
            topic: self.topic.clone(),
        })?;
        serde_json::from_str(raw).map_err(|source| CodecError::TypeMismatch {
            payload_type: self.payload_type.clone(),
            expected: short_type_name::<T>(),
            source,
        })
    }

    /// Encode as one wire line including the trailing `\n`.
    pub fn to_line(&self) -> Result<String> {
        let mut line = self.to_json()?;
        line.push('\n');
        Ok(line)
    }

    /// Encode as a single JSON object without the terminator.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| CodecError::Encode {
            type_name: "Envelope".to_string(),
            source,
        })
    }

    /// Decode one wire line. The terminator is optional here; readers are
    /// responsible for discarding partial frames at end of stream.
    pub fn from_line(line: &str) -> Result<Self> {
        let body = strip_terminator(line).unwrap_or(line);
        if body.trim().is_empty() {
            return Err(CodecError::decode("empty line"));
        }
        let envelope: Envelope = serde_json::from_str(body)
            .map_err(|source| CodecError::decode_with_source("malformed envelope JSON", source))?;
        validate_topic(&envelope.topic)?;
        Ok(envelope)
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic
            && self.payload_type == other.payload_type
            && self.timestamp == other.timestamp
            && self.payload.as_deref().map(RawValue::get)
                == other.payload.as_deref().map(RawValue::get)
    }
}

/// Topics must contain something other than whitespace
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(CodecError::InvalidTopic {
            reason: "topic must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Unqualified type name of `T`, with module paths stripped from every
/// segment (`alloc::vec::Vec<fleet_types::WorkerStatus>` → `Vec<WorkerStatus>`).
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut token = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            token.push(ch);
        } else {
            push_last_segment(&mut out, &token);
            token.clear();
            out.push(ch);
        }
    }
    push_last_segment(&mut out, &token);
    out
}

fn push_last_segment(out: &mut String, path: &str) {
    out.push_str(path.rsplit("::").next().unwrap_or(path));
}
