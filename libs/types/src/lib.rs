//! # Fleet Shared Types
//!
//! Leaf crate of the fleet event bus. Everything here is transport-agnostic
//! and is shared by the broker, the wire codec and the network layer.
//!
//! ## Contents
//!
//! - **[`BoundedHistory`]**: fixed-capacity FIFO used for replay both inside the
//!   in-process broker and inside the TCP wire server
//! - **Payload models**: [`WorkerStatus`], [`ServiceStatus`], [`ConsoleLogMessage`]
//!   and [`ServiceState`], the well-known values carried inside envelopes
//! - **Topic names**: [`topics`] constants used by producers and observers
//!
//! ## Quick Start
//!
//! ```rust
//! use fleet_types::BoundedHistory;
//!
//! let history = BoundedHistory::new(3).unwrap();
//! for item in ["a", "b", "c", "d"] {
//!     history.enqueue(item);
//! }
//! assert_eq!(history.snapshot(), vec!["b", "c", "d"]);
//! ```

pub mod common;
pub mod history;
pub mod messages;

pub use common::errors::HistoryError;
pub use history::BoundedHistory;
pub use messages::{topics, ConsoleLogMessage, ServiceState, ServiceStatus, WorkerStatus};
