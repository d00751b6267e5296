//! Common error types shared across the bus crates.

pub mod errors;
