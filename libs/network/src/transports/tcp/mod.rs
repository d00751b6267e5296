//! TCP line transport
//!
//! ```text
//!  WireClient ──line──►  WireServer  ──line──► every other peer
//!      ▲                    │  history (replayed to new peers)
//!      └──────── relay ─────┘
//! ```
//!
//! Both sides share the envelope codec and [`crate::framing::LineReader`].
//! Writes to one socket are serialized by a single writer task per
//! connection, so lines never interleave.

pub mod client;
pub mod server;

pub use client::{ClientEvent, ConnectionState, WireClient};
pub use server::WireServer;
