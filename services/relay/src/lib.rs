//! # Fleet Relay
//!
//! Process roles built on the fleet bus crates:
//!
//! - **Hub** ([`Hub`]): owns the [`fleet_broker::Broker`] and a
//!   [`fleet_network::WireServer`]; the [`EnvelopeForwarder`] broadcasts the
//!   configured channels to every connected peer
//! - **Agent** ([`Agent`]): a [`fleet_network::WireClient`] kept connected to
//!   a hub, sending [`Heartbeat`]s and logging forwarded envelopes
//!
//! ```text
//! producers ─► Broker ─► EnvelopeForwarder ─► WireServer ═══ TCP ═══ WireClient ─► Agent
//!                                                  ▲                     │
//!                                                  └──── HostHeartbeat ──┘
//! ```
//!
//! [`ingest`] and [`uplink`] connect a client to a broker in either
//! direction for processes that host both.

pub mod agent;
pub mod bridge;
pub mod error;
pub mod forwarder;
pub mod heartbeat;
pub mod hub;
pub mod logging;
mod supervise;

pub use agent::Agent;
pub use bridge::{ingest, uplink};
pub use error::{RelayError, Result};
pub use forwarder::EnvelopeForwarder;
pub use heartbeat::Heartbeat;
pub use hub::Hub;
pub use supervise::spawn_supervised;
