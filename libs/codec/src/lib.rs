//! # Fleet Bus Codec
//!
//! ## Purpose
//!
//! The "rules" layer of the bus: what a message looks like and how it is
//! written to a byte stream.
//! - [`Envelope`]: topic-tagged, typed, timestamped unit of data
//! - Line framing: exactly one JSON object per `\n`-terminated UTF-8 line
//! - [`CodecError`]: encode/decode/type-mismatch taxonomy
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → broker / network
//!     ↑           ↓              ↓
//! History     Envelope       Subscriptions
//! Payloads    Line format    Sockets
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! {"topic":"ServiceStatus","payloadType":"ServiceStatus","payload":{...},"timestamp":"2024-01-01T00:00:00Z"}\n
//! ```
//!
//! Payloads are kept as raw JSON text and decoded lazily by the consumer via
//! [`Envelope::decode_payload`]; the transport never decodes them.
//!
//! ## What This Crate Does NOT Contain
//! - Socket reading/writing (belongs in network/)
//! - Topic registries or fan-out (belongs in broker/)

pub mod envelope;
pub mod error;
pub mod framing;

pub use envelope::{short_type_name, validate_topic, Envelope};
pub use error::{CodecError, Result};
pub use framing::{strip_terminator, LINE_TERMINATOR};
