//! # Topic Broker - In-Process Replay and Fan-Out
//!
//! ## Purpose
//!
//! Same-process analogue of the wire server's relay and replay behavior.
//! Producers push typed values under a topic; every subscriber of that topic
//! first receives the topic's recent history, then every later push, with no
//! gap and no duplicate at the boundary.
//!
//! ## Architecture
//!
//! ```text
//! push(topic, value) ──► Envelope ──► line ──┐
//!                                            ▼
//!   topics: DashMap<String, Arc<Topic>>   Topic { Mutex<history + subscribers> }
//!                                            │ try_send (never blocks)
//!                              ┌─────────────┼─────────────┐
//!                              ▼             ▼             ▼
//!                         Subscription  Subscription  Subscription
//!                         replay ++ live
//! ```
//!
//! ## Guarantees
//!
//! - Registration and history snapshot happen under the topic lock, so a
//!   subscriber sees `snapshot ++ later pushes` exactly
//! - Topics never contend with each other; there is no broker-wide lock
//! - A full or closed subscriber queue misses the message; the publisher is
//!   never slowed down
//! - Dropping a [`Subscription`] deregisters it immediately

pub mod broker;
pub mod error;
pub mod subscription;

pub use broker::Broker;
pub use error::{BrokerError, Result};
pub use subscription::Subscription;
