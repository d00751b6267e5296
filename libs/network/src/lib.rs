//! # Fleet Network - TCP Line Transport
//!
//! Carries envelopes across process and machine boundaries as one JSON
//! object per line over plain TCP.
//!
//! ## Components
//!
//! - **[`WireServer`]**: accepts many peers, replays recent history to each
//!   new peer, relays every inbound envelope to all *other* peers
//! - **[`WireClient`]**: connects with a bounded timeout, decouples
//!   [`WireClient::send`] from the socket through an outgoing queue,
//!   dispatches inbound envelopes to handlers and receivers
//! - **[`recovery`]**: caller-owned reconnect helpers with capped
//!   exponential backoff
//! - **[`framing::LineReader`]**: cancel-safe, size-limited line reader
//!   shared by both sides
//!
//! ## Failure Isolation
//!
//! A malformed line drops that line. A read or write failure ends only the
//! connection it happened on. The client surfaces a lost connection as a
//! single `Disconnected` event; reconnecting is the caller's job.

pub mod error;
pub mod framing;
pub mod recovery;
pub mod transports;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use recovery::{connect_with_retry, maintain_connection, ReconnectPolicy};
pub use transports::tcp::client::{ClientEvent, ConnectionState, WireClient};
pub use transports::tcp::server::{ConnectionId, WireServer};
