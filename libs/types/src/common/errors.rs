//! Error types for shared bus primitives
//!
//! Construction-time failures for the primitives in this crate. These are
//! configuration mistakes and are expected to fail fast at startup.

use thiserror::Error;

/// Errors that can occur when constructing a [`crate::BoundedHistory`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Capacity must be strictly positive
    #[error("History capacity must be > 0, got {capacity}")]
    ZeroCapacity { capacity: usize },
}
