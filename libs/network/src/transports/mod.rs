//! Transport implementations
//!
//! Only TCP is provided: a line-delimited JSON protocol with one envelope per
//! line. See [`tcp::server::WireServer`] and [`tcp::client::WireClient`].

pub mod tcp;
